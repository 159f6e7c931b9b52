//! Pipeline-level output exposure.
//!
//! The final stage of graph definition maps task output slots
//! (post-aggregation for fanned-out producers) to named pipeline
//! outputs. This is pure renaming and selection, no computation.

use serde::{Deserialize, Serialize};

/// The task output slot (and optional sub-path within it) a pipeline
/// output is sourced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSource {
    /// The producing task id.
    pub task: String,
    /// The output slot name on that task.
    pub slot: String,
    /// Optional sub-path inside the slot's published folder, e.g.
    /// `total` under a `results` folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

impl OutputSource {
    /// Creates a source pointing at a whole slot.
    #[must_use]
    pub fn slot(task: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            slot: slot.into(),
            sub_path: None,
        }
    }

    /// Creates a source pointing at a sub-path within a slot.
    #[must_use]
    pub fn path(
        task: impl Into<String>,
        slot: impl Into<String>,
        sub_path: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            slot: slot.into(),
            sub_path: Some(sub_path.into()),
        }
    }
}

/// A named pipeline-level output.
///
/// Created at graph-definition time; populated only after every
/// contributing task instance completes successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// The externally visible output name.
    pub name: String,
    /// Where the output comes from.
    pub source: OutputSource,
    /// Human-readable description for host tooling.
    #[serde(default)]
    pub description: String,
    /// Optional external alias for documentation/discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl PipelineOutput {
    /// Creates a new pipeline output.
    #[must_use]
    pub fn new(name: impl Into<String>, source: OutputSource) -> Self {
        Self {
            name: name.into(),
            source,
            description: String::new(),
            alias: None,
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_round_trips_through_json() {
        let output = PipelineOutput::new("results", OutputSource::path("post", "results", "total"))
            .with_description("Folder with raw result files.")
            .with_alias("total_radiation_results");

        let json = serde_json::to_string(&output).unwrap();
        let back: PipelineOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(output, back);
    }

    #[test]
    fn test_slot_source_has_no_sub_path() {
        let source = OutputSource::slot("post", "metrics");
        assert_eq!(source.sub_path, None);
    }
}
