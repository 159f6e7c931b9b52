//! Error types for the recipeflow engine.
//!
//! Construction-time errors (parameters, graph wiring) are fatal and
//! all-or-nothing: a failed `bind` or `add_task` leaves the receiver
//! unchanged. Resolve-time errors are scoped to a single fan-out
//! instance and carry enough context (task id, item identifier) to
//! locate the failing unit without re-running the whole pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for recipeflow operations.
#[derive(Debug, Error)]
pub enum RecipeflowError {
    /// A parameter declaration or binding error.
    #[error("{0}")]
    Parameter(#[from] ParameterError),

    /// A graph construction or validation error.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A path-template definition or substitution error.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// An output aggregation error.
    #[error("{0}")]
    Aggregation(#[from] AggregationError),

    /// A single fan-out instance (or non-fanned task) failed to execute.
    #[error("{0}")]
    InstanceExecution(#[from] InstanceExecutionError),

    /// The run was cancelled.
    #[error("Pipeline run cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the parameter set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// The bound value violates the parameter's declared constraint.
    #[error("Constraint violation for parameter '{name}': {reason}")]
    ConstraintViolation {
        /// The parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The referenced parameter was never declared.
    #[error("Unknown parameter: '{name}'")]
    UnknownParameter {
        /// The parameter name.
        name: String,
    },

    /// A parameter with this name is already declared.
    #[error("Parameter '{name}' is already declared")]
    AlreadyDeclared {
        /// The parameter name.
        name: String,
    },

    /// The set was sealed with required parameters still unbound.
    #[error("Parameter '{name}' has no default and was never bound")]
    MissingRequired {
        /// The parameter name.
        name: String,
    },

    /// The set is sealed and rejects further writes.
    #[error("Parameter set is sealed; cannot bind '{name}'")]
    Sealed {
        /// The parameter name.
        name: String,
    },
}

/// Errors raised while constructing or validating the dependency graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// An input binding references a parameter or task output that is
    /// not present in the graph yet.
    #[error("Unresolved input '{input}' on task '{task}': {reference} is not in the graph")]
    UnresolvedInput {
        /// The task being added.
        task: String,
        /// The declared input name.
        input: String,
        /// The dangling reference, rendered for diagnostics.
        reference: String,
    },

    /// A task with this id already exists in the graph.
    #[error("Duplicate task id: '{task}'")]
    DuplicateTask {
        /// The conflicting task id.
        task: String,
    },

    /// A cycle was detected in the dependency graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A fan-out loop source does not resolve to a dynamic collection
    /// produced by an ancestor task.
    #[error("Invalid loop source for task '{task}': {reason}")]
    InvalidLoopSource {
        /// The fanned-out task id.
        task: String,
        /// Why the loop source was rejected.
        reason: String,
    },

    /// A task declares the same input name twice.
    #[error("Duplicate input '{input}' on task '{task}'")]
    DuplicateInput {
        /// The task id.
        task: String,
        /// The repeated input name.
        input: String,
    },

    /// A pipeline output references an output slot no task exposes.
    #[error("Pipeline output '{output}' references unknown source '{source_ref}'")]
    UnknownOutputSource {
        /// The pipeline output name.
        output: String,
        /// The dangling source reference.
        source_ref: String,
    },

    /// The same pipeline output name was exposed twice.
    #[error("Pipeline output '{output}' is already exposed")]
    DuplicatePipelineOutput {
        /// The repeated output name.
        output: String,
    },

    /// The graph has no tasks.
    #[error("Cannot build an empty graph")]
    EmptyGraph,

    /// A template error surfaced during graph construction.
    #[error("{0}")]
    Template(#[from] TemplateError),
}

/// Error raised when a cycle is detected in the dependency graph.
///
/// Construction order makes this unreachable today (inputs may only
/// reference already-added tasks), but `topological_order` still
/// re-validates and reports the offending path if a future extension
/// introduces same-pass references.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cycle detected in dependency graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of task ids forming the cycle.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Errors raised by the path-template interpreter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A template references an attribute the collection item does not
    /// carry, or the placeholder syntax is malformed.
    #[error("Invalid template substitution in '{template}': {reason}")]
    InvalidTemplateSubstitution {
        /// The offending template text.
        template: String,
        /// Why substitution failed.
        reason: String,
    },

    /// The same sub-path key was defined twice within one binding.
    #[error("Duplicate template key '{key}' in sub-path mapping")]
    DuplicateTemplateKey {
        /// The duplicated key.
        key: String,
    },
}

/// Errors raised while aggregating fan-out instance outputs.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "Incomplete fan-out for task '{task}': missing {missing:?}, failed {failed:?}"
)]
pub struct AggregationError {
    /// The fanned-out producer task id.
    pub task: String,
    /// Item ids with no recorded output at all.
    pub missing: Vec<String>,
    /// Item ids whose instance failed.
    pub failed: Vec<String>,
}

impl AggregationError {
    /// Creates a new incomplete fan-out error.
    #[must_use]
    pub fn incomplete(
        task: impl Into<String>,
        missing: Vec<String>,
        failed: Vec<String>,
    ) -> Self {
        Self {
            task: task.into(),
            missing,
            failed,
        }
    }
}

/// Error raised when a single task instance fails to execute.
///
/// For a fanned-out task the item identifier pinpoints the instance;
/// sibling instances are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Task '{task}'{} failed: {reason}", item.as_ref().map(|i| format!(" [item '{i}']")).unwrap_or_default())]
pub struct InstanceExecutionError {
    /// The task id.
    pub task: String,
    /// The collection item identifier, when the task was fanned out.
    pub item: Option<String>,
    /// The executor-reported failure reason.
    pub reason: String,
}

impl InstanceExecutionError {
    /// Creates a failure record for a non-fanned task.
    #[must_use]
    pub fn task(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            item: None,
            reason: reason.into(),
        }
    }

    /// Creates a failure record for one fan-out instance.
    #[must_use]
    pub fn instance(
        task: impl Into<String>,
        item: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            task: task.into(),
            item: Some(item.into()),
            reason: reason.into(),
        }
    }
}
