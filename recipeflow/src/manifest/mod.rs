//! Serializable pipeline description for host tooling.
//!
//! A manifest carries everything a host UI or CLI needs to present and
//! validate a pipeline's inputs and discover its outputs: names,
//! kinds, constraints, defaults, descriptions, and aliases. It is a
//! description only; binding and execution stay in this crate.

use crate::graph::{DependencyGraph, PipelineOutput};
use crate::params::ParameterDecl;
use serde::{Deserialize, Serialize};

/// The serializable description of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// The pipeline name.
    pub name: String,
    /// Declared input parameters, in declaration order.
    pub inputs: Vec<ParameterDecl>,
    /// Exposed pipeline-level outputs, in exposure order.
    pub outputs: Vec<PipelineOutput>,
}

impl PipelineManifest {
    /// Builds the manifest of a dependency graph.
    #[must_use]
    pub fn of(graph: &DependencyGraph) -> Self {
        Self {
            name: graph.name().to_string(),
            inputs: graph.params().declarations().to_vec(),
            outputs: graph.outputs().to_vec(),
        }
    }

    /// Serializes the manifest to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; practically unreachable for this
    /// type.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
