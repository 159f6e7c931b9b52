//! Path-template interpreter for per-item substitution.
//!
//! Sub-folder and sub-path templates use a fixed placeholder syntax,
//! `{{item.attribute}}`, resolved exclusively against the current
//! collection item during fan-out. Parsing is a first-class step so
//! that attribute references can be checked at definition time instead
//! of failing deep inside a run.

use crate::core::CollectionItem;
use crate::errors::TemplateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// One parsed segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Segment {
    /// Verbatim text.
    Literal(String),
    /// An `{{item.<attribute>}}` placeholder.
    Attribute(String),
}

/// A parsed path template, e.g. `grid/{{item.identifier}}.pts`.
///
/// Templates without placeholders are valid and substitute to
/// themselves, so static sub-paths and templated ones share one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` for malformed placeholder
    /// syntax or a placeholder that does not dereference `item`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TemplateError> {
        let raw = raw.into();
        let re = placeholder_regex();

        let mut segments = Vec::new();
        let mut cursor = 0;
        for captures in re.captures_iter(&raw) {
            // Placeholder regex always has a full match and one group.
            let (full, inner) = match (captures.get(0), captures.get(1)) {
                (Some(full), Some(inner)) => (full, inner),
                _ => continue,
            };
            if full.start() > cursor {
                segments.push(Segment::Literal(raw[cursor..full.start()].to_string()));
            }

            let attribute = inner
                .as_str()
                .strip_prefix("item.")
                .ok_or_else(|| TemplateError::InvalidTemplateSubstitution {
                    template: raw.clone(),
                    reason: format!(
                        "placeholder '{}' must dereference 'item'",
                        inner.as_str()
                    ),
                })?;
            if attribute.is_empty() || attribute.contains('.') {
                return Err(TemplateError::InvalidTemplateSubstitution {
                    template: raw.clone(),
                    reason: format!("malformed attribute reference '{}'", inner.as_str()),
                });
            }
            segments.push(Segment::Attribute(attribute.to_string()));
            cursor = full.end();
        }
        if cursor < raw.len() {
            segments.push(Segment::Literal(raw[cursor..].to_string()));
        }

        // Brace text the regex did not consume is a syntax error, not a literal.
        for segment in &segments {
            if let Segment::Literal(text) = segment {
                if text.contains("{{") || text.contains("}}") {
                    return Err(TemplateError::InvalidTemplateSubstitution {
                        template: raw.clone(),
                        reason: "unbalanced or malformed '{{ }}' placeholder".to_string(),
                    });
                }
            }
        }

        Ok(Self { raw, segments })
    }

    /// The original template text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns true if the template carries no item placeholders.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// The attribute names this template references.
    #[must_use]
    pub fn referenced_attributes(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Attribute(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Checks every referenced attribute against the declared item shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` naming the first unknown
    /// attribute. Called at definition time by the graph builder.
    pub fn validate_attributes(&self) -> Result<(), TemplateError> {
        for name in self.referenced_attributes() {
            if !CollectionItem::attribute_names().contains(&name) {
                return Err(TemplateError::InvalidTemplateSubstitution {
                    template: self.raw.clone(),
                    reason: format!(
                        "item has no attribute '{}' (available: {})",
                        name,
                        CollectionItem::attribute_names().join(", ")
                    ),
                });
            }
        }
        Ok(())
    }

    /// Substitutes the current item's attributes into the template.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` if the item lacks a
    /// referenced attribute; callers abort only the affected instance.
    pub fn substitute(&self, item: &CollectionItem) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Attribute(name) => {
                    let value = item.attribute(name).ok_or_else(|| {
                        TemplateError::InvalidTemplateSubstitution {
                            template: self.raw.clone(),
                            reason: format!(
                                "item '{}' has no attribute '{}'",
                                item.identifier, name
                            ),
                        }
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}
