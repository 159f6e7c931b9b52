//! Artifact types for task inputs and outputs.

use super::CollectionItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of a concrete artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A single file.
    File,
    /// A folder of files.
    Folder,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// A named artifact produced by a task instance.
///
/// Artifacts are addressed by pipeline-relative paths; the engine never
/// reads their contents, only routes them between tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Whether this is a file or a folder.
    pub kind: ArtifactKind,

    /// Pipeline-relative path of the artifact.
    pub path: String,

    /// Additional metadata about the artifact.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// When the artifact was recorded (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Creates a file artifact at the given pipeline-relative path.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(ArtifactKind::File, path)
    }

    /// Creates a folder artifact at the given pipeline-relative path.
    #[must_use]
    pub fn folder(path: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Folder, path)
    }

    fn new(kind: ArtifactKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            metadata: HashMap::new(),
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Adds metadata to the artifact.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The value a completed task instance reports for one output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum OutputValue {
    /// A single file or folder artifact.
    Artifact(Artifact),

    /// A runtime-sized ordered collection, one entry per discovered
    /// sub-unit. Drives downstream fan-out.
    Collection(Vec<CollectionItem>),

    /// The instance completed but legitimately produced nothing.
    ///
    /// Distinct from a missing or failed instance when aggregating.
    Empty,
}

impl OutputValue {
    /// Returns the collection items, if this value is a collection.
    #[must_use]
    pub fn as_collection(&self) -> Option<&[CollectionItem]> {
        match self {
            Self::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the artifact, if this value is a single artifact.
    #[must_use]
    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Returns true for an explicitly empty value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_creation() {
        let artifact = Artifact::folder("results/total");
        assert_eq!(artifact.kind, ArtifactKind::Folder);
        assert_eq!(artifact.path, "results/total");
    }

    #[test]
    fn test_artifact_with_metadata() {
        let artifact = Artifact::file("grid/room.pts")
            .with_metadata("sensor_count", serde_json::json!(120));
        assert_eq!(
            artifact.metadata.get("sensor_count"),
            Some(&serde_json::json!(120))
        );
    }

    #[test]
    fn test_artifact_serialization_round_trip() {
        let artifact = Artifact::file("resources/sky.mtx");
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, back);
    }

    #[test]
    fn test_output_value_accessors() {
        let value = OutputValue::Collection(vec![CollectionItem::new("A", 10)]);
        assert_eq!(value.as_collection().unwrap().len(), 1);
        assert!(value.as_artifact().is_none());
        assert!(!value.is_empty());
        assert!(OutputValue::Empty.is_empty());
    }
}
