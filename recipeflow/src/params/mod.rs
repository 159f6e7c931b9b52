//! Pipeline parameter declaration and binding.
//!
//! A [`ParameterSet`] is the typed front door of a pipeline: scalar and
//! file inputs are declared with constraints and optional defaults,
//! values are bound and validated one at a time, and the sealed set is
//! read-only to every downstream component. A failed bind never
//! mutates the set.

use crate::errors::ParameterError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// A whole-number scalar.
    Integer,
    /// A floating-point scalar.
    Float,
    /// A free-text or enumerated scalar.
    String,
    /// A boolean scalar.
    Boolean,
    /// A file path, checked against an allowed-extension set.
    File,
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Boolean => write!(f, "boolean"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ParameterValue {
    /// A whole-number scalar.
    Integer(i64),
    /// A floating-point scalar.
    Float(f64),
    /// A text scalar.
    String(String),
    /// A boolean scalar.
    Boolean(bool),
    /// A pipeline-relative file path.
    File(String),
}

impl ParameterValue {
    fn kind(&self) -> ParameterKind {
        match self {
            Self::Integer(_) => ParameterKind::Integer,
            Self::Float(_) => ParameterKind::Float,
            Self::String(_) => ParameterKind::String,
            Self::Boolean(_) => ParameterKind::Boolean,
            Self::File(_) => ParameterKind::File,
        }
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// The declared constraint on a parameter's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Constraint {
    /// An inclusive numeric range; open bounds are allowed.
    Range {
        /// Inclusive lower bound.
        minimum: Option<f64>,
        /// Inclusive upper bound.
        maximum: Option<f64>,
    },
    /// A closed set of allowed string values.
    Enum {
        /// The allowed values.
        allowed: Vec<String>,
    },
    /// An allowed-extension set for file parameters, without the dot.
    Extensions {
        /// The allowed extensions, e.g. `["wea"]`.
        allowed: Vec<String>,
    },
}

impl Constraint {
    fn check(&self, name: &str, value: &ParameterValue) -> Result<(), ParameterError> {
        let violation = |reason: String| ParameterError::ConstraintViolation {
            name: name.to_string(),
            reason,
        };

        match self {
            Self::Range { minimum, maximum } => {
                let numeric = value
                    .as_numeric()
                    .ok_or_else(|| violation(format!("{} is not numeric", value.kind())))?;
                if let Some(min) = minimum {
                    if numeric < *min {
                        return Err(violation(format!("{numeric} is below the minimum of {min}")));
                    }
                }
                if let Some(max) = maximum {
                    if numeric > *max {
                        return Err(violation(format!("{numeric} is above the maximum of {max}")));
                    }
                }
                Ok(())
            }
            Self::Enum { allowed } => match value {
                ParameterValue::String(text) if allowed.contains(text) => Ok(()),
                ParameterValue::String(text) => Err(violation(format!(
                    "'{}' is not one of [{}]",
                    text,
                    allowed.join(", ")
                ))),
                other => Err(violation(format!(
                    "expected a string, got {}",
                    other.kind()
                ))),
            },
            Self::Extensions { allowed } => match value {
                ParameterValue::File(path) => {
                    let matches = allowed
                        .iter()
                        .any(|ext| path.ends_with(&format!(".{ext}")));
                    if matches {
                        Ok(())
                    } else {
                        Err(violation(format!(
                            "'{}' does not carry an allowed extension [{}]",
                            path,
                            allowed.join(", ")
                        )))
                    }
                }
                other => Err(violation(format!("expected a file, got {}", other.kind()))),
            },
        }
    }
}

/// A declared pipeline parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    /// The parameter name, unique within the set.
    pub name: String,
    /// The kind of value accepted.
    pub kind: ParameterKind,
    /// Human-readable description for host tooling.
    #[serde(default)]
    pub description: String,
    /// Optional external alias for documentation/discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Default value; parameters without one must be bound before sealing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParameterValue>,
    /// Declared constraint, checked at bind time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

impl ParameterDecl {
    fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            alias: None,
            default: None,
            constraint: None,
        }
    }

    /// Declares an integer parameter.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Integer)
    }

    /// Declares a float parameter.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Float)
    }

    /// Declares a string parameter.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::String)
    }

    /// Declares a boolean parameter.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::Boolean)
    }

    /// Declares a file parameter.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, ParameterKind::File)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the external alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: ParameterValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Constrains numeric values to an inclusive range.
    #[must_use]
    pub fn with_range(mut self, minimum: impl Into<Option<f64>>, maximum: impl Into<Option<f64>>) -> Self {
        self.constraint = Some(Constraint::Range {
            minimum: minimum.into(),
            maximum: maximum.into(),
        });
        self
    }

    /// Constrains string values to a closed set.
    #[must_use]
    pub fn with_enum(mut self, allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.constraint = Some(Constraint::Enum {
            allowed: allowed.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Constrains file values to an allowed-extension set.
    #[must_use]
    pub fn with_extensions(mut self, allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.constraint = Some(Constraint::Extensions {
            allowed: allowed.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn validate_value(&self, value: &ParameterValue) -> Result<(), ParameterError> {
        if value.kind() != self.kind {
            // Integers are acceptable where floats are declared.
            let widened = self.kind == ParameterKind::Float
                && value.kind() == ParameterKind::Integer;
            if !widened {
                return Err(ParameterError::ConstraintViolation {
                    name: self.name.clone(),
                    reason: format!("expected {}, got {}", self.kind, value.kind()),
                });
            }
        }
        if let Some(constraint) = &self.constraint {
            constraint.check(&self.name, value)?;
        }
        Ok(())
    }
}

/// The mutable set of declared parameters for one pipeline.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    declarations: Vec<ParameterDecl>,
    bound: HashMap<String, ParameterValue>,
    sealed: bool,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyDeclared` for a repeated name, `Sealed` after
    /// sealing, and `ConstraintViolation` if the declared default does
    /// not satisfy its own constraint.
    pub fn declare(&mut self, decl: ParameterDecl) -> Result<(), ParameterError> {
        if self.sealed {
            return Err(ParameterError::Sealed {
                name: decl.name.clone(),
            });
        }
        if self.declaration(&decl.name).is_some() {
            return Err(ParameterError::AlreadyDeclared {
                name: decl.name.clone(),
            });
        }
        if let Some(default) = &decl.default {
            decl.validate_value(default)?;
        }
        self.declarations.push(decl);
        Ok(())
    }

    /// Binds a value to a declared parameter.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParameter` for an undeclared name and
    /// `ConstraintViolation` when the value is outside the declared
    /// range, not in the declared enum, or carries a disallowed file
    /// extension. The set is unchanged on error.
    pub fn bind(&mut self, name: &str, value: ParameterValue) -> Result<(), ParameterError> {
        if self.sealed {
            return Err(ParameterError::Sealed {
                name: name.to_string(),
            });
        }
        let decl = self
            .declaration(name)
            .ok_or_else(|| ParameterError::UnknownParameter {
                name: name.to_string(),
            })?;
        decl.validate_value(&value)?;
        self.bound.insert(name.to_string(), value);
        Ok(())
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&ParameterDecl> {
        self.declarations.iter().find(|decl| decl.name == name)
    }

    /// All declarations in declaration order.
    #[must_use]
    pub fn declarations(&self) -> &[ParameterDecl] {
        &self.declarations
    }

    /// The effective value of a parameter: bound value or default.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&ParameterValue> {
        self.bound
            .get(name)
            .or_else(|| self.declaration(name).and_then(|decl| decl.default.as_ref()))
    }

    /// Names of parameters that have neither a default nor a bound value.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&str> {
        self.declarations
            .iter()
            .filter(|decl| decl.default.is_none() && !self.bound.contains_key(&decl.name))
            .map(|decl| decl.name.as_str())
            .collect()
    }

    /// Returns whether the set has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seals the set, making it read-only to downstream components.
    ///
    /// # Errors
    ///
    /// Returns `MissingRequired` if any parameter without a default was
    /// never bound.
    pub fn seal(&mut self) -> Result<(), ParameterError> {
        for decl in &self.declarations {
            if decl.default.is_none() && !self.bound.contains_key(&decl.name) {
                return Err(ParameterError::MissingRequired {
                    name: decl.name.clone(),
                });
            }
        }
        self.sealed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn north() -> ParameterDecl {
        ParameterDecl::float("north")
            .with_description("A number for rotation from north.")
            .with_default(ParameterValue::Float(0.0))
            .with_range(-360.0, 360.0)
    }

    #[test]
    fn test_declare_and_default() {
        let mut params = ParameterSet::new();
        params.declare(north()).unwrap();
        assert_eq!(params.value("north"), Some(&ParameterValue::Float(0.0)));
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut params = ParameterSet::new();
        params.declare(north()).unwrap();
        let err = params.declare(north()).unwrap_err();
        assert!(matches!(err, ParameterError::AlreadyDeclared { .. }));
    }

    #[test]
    fn test_bind_within_range() {
        let mut params = ParameterSet::new();
        params.declare(north()).unwrap();
        params.bind("north", ParameterValue::Float(90.0)).unwrap();
        assert_eq!(params.value("north"), Some(&ParameterValue::Float(90.0)));
    }

    #[test]
    fn test_bind_out_of_range_fails() {
        let mut params = ParameterSet::new();
        params.declare(north()).unwrap();
        let err = params.bind("north", ParameterValue::Float(400.0)).unwrap_err();
        assert!(matches!(err, ParameterError::ConstraintViolation { .. }));
        // State unchanged: default still in effect.
        assert_eq!(params.value("north"), Some(&ParameterValue::Float(0.0)));
    }

    #[test]
    fn test_bind_unknown_parameter() {
        let mut params = ParameterSet::new();
        let err = params
            .bind("south", ParameterValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, ParameterError::UnknownParameter { .. }));
    }

    #[test]
    fn test_enum_constraint() {
        let mut params = ParameterSet::new();
        params
            .declare(
                ParameterDecl::string("output_type")
                    .with_default(ParameterValue::String("solar".to_string()))
                    .with_enum(["visible", "solar"]),
            )
            .unwrap();

        params
            .bind("output_type", ParameterValue::String("visible".to_string()))
            .unwrap();
        let err = params
            .bind("output_type", ParameterValue::String("thermal".to_string()))
            .unwrap_err();
        assert!(matches!(err, ParameterError::ConstraintViolation { .. }));
        // Last good value survives the failed bind.
        assert_eq!(
            params.value("output_type"),
            Some(&ParameterValue::String("visible".to_string()))
        );
    }

    #[test]
    fn test_file_extension_constraint() {
        let mut params = ParameterSet::new();
        params
            .declare(ParameterDecl::file("wea").with_extensions(["wea"]))
            .unwrap();

        let err = params
            .bind("wea", ParameterValue::File("weather.txt".to_string()))
            .unwrap_err();
        assert!(matches!(err, ParameterError::ConstraintViolation { .. }));
        assert_eq!(params.value("wea"), None);

        params
            .bind("wea", ParameterValue::File("weather.wea".to_string()))
            .unwrap();
    }

    #[test]
    fn test_integer_accepted_for_float_range() {
        let mut params = ParameterSet::new();
        params.declare(north()).unwrap();
        params.bind("north", ParameterValue::Integer(45)).unwrap();
    }

    #[test]
    fn test_seal_requires_unbound_defaults() {
        let mut params = ParameterSet::new();
        params
            .declare(ParameterDecl::file("model").with_extensions(["hbjson", "json"]))
            .unwrap();

        let err = params.seal().unwrap_err();
        assert!(matches!(err, ParameterError::MissingRequired { .. }));

        params
            .bind("model", ParameterValue::File("model.hbjson".to_string()))
            .unwrap();
        params.seal().unwrap();
        assert!(params.is_sealed());

        let err = params
            .bind("model", ParameterValue::File("other.hbjson".to_string()))
            .unwrap_err();
        assert!(matches!(err, ParameterError::Sealed { .. }));
    }

    #[test]
    fn test_default_must_satisfy_constraint() {
        let mut params = ParameterSet::new();
        let err = params
            .declare(
                ParameterDecl::integer("timestep")
                    .with_default(ParameterValue::Integer(0))
                    .with_range(1.0, 60.0),
            )
            .unwrap_err();
        assert!(matches!(err, ParameterError::ConstraintViolation { .. }));
    }

    #[test]
    fn test_declaration_serializes() {
        let decl = ParameterDecl::file("wea")
            .with_description("Wea file.")
            .with_alias("wea_input")
            .with_extensions(["wea"]);
        let json = serde_json::to_value(&decl).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["alias"], "wea_input");
    }
}
