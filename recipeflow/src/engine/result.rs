//! Run outcome types.

use crate::aggregate::MergedArtifact;
use crate::core::InstanceStatus;
use crate::errors::{AggregationError, InstanceExecutionError};
use crate::executor::TaskOutputs;
use crate::fanout::TaskInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Anything that stopped a run or part of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunFailure {
    /// An instance failed to resolve or execute.
    Instance(InstanceExecutionError),
    /// A fan-out could not be merged to completion.
    Aggregation(AggregationError),
    /// The run was cancelled before the named task's work finished.
    Cancelled {
        /// The task that was about to run or was mid-dispatch.
        task: String,
        /// The reason passed to the cancellation token.
        reason: String,
    },
}

/// The terminal record of one executed instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceResult {
    /// Unique id of the instance within the run.
    pub instance_id: Uuid,
    /// The collection item identifier, when fanned out.
    pub item: Option<String>,
    /// Terminal status.
    pub status: InstanceStatus,
    /// Outputs the executor reported, keyed by slot name.
    pub outputs: TaskOutputs,
    /// The failure reason, if the instance did not complete.
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub duration_ms: f64,
}

impl InstanceResult {
    /// Records an instance that never ran because its per-item
    /// resolution failed.
    #[must_use]
    pub fn failed_item(error: &InstanceExecutionError) -> Self {
        Self {
            instance_id: crate::utils::generate_uuid(),
            item: error.item.clone(),
            status: InstanceStatus::Fail,
            outputs: TaskOutputs::new(),
            error: Some(error.reason.clone()),
            duration_ms: 0.0,
        }
    }

    /// Records an instance that was never dispatched because the run
    /// was cancelled.
    #[must_use]
    pub fn cancelled(instance: &TaskInstance, reason: &str) -> Self {
        Self {
            instance_id: instance.instance_id,
            item: instance.item_id().map(ToString::to_string),
            status: InstanceStatus::Cancel,
            outputs: TaskOutputs::new(),
            error: Some(reason.to_string()),
            duration_ms: 0.0,
        }
    }
}

/// The aggregate outcome of one task across all of its instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunResult {
    /// The task id.
    pub task: String,
    /// Terminal status of the task as a whole.
    pub status: InstanceStatus,
    /// Every instance that was expanded, in completion order.
    pub instances: Vec<InstanceResult>,
    /// Merged fan-out outputs, keyed by slot name. Empty for
    /// non-fanned tasks.
    pub merged: HashMap<String, MergedArtifact>,
}

impl TaskRunResult {
    pub(crate) fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            status: InstanceStatus::Pending,
            instances: Vec::new(),
            merged: HashMap::new(),
        }
    }

    /// The runtime output values the task published, keyed by slot.
    ///
    /// Only single-instance tasks publish values directly; fanned
    /// tasks publish through their merged artifacts instead.
    #[must_use]
    pub fn published_outputs(&self) -> TaskOutputs {
        match self.instances.as_slice() {
            [only] if only.item.is_none() => only.outputs.clone(),
            _ => TaskOutputs::new(),
        }
    }

    /// Total number of expanded instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// A pipeline output resolved to its concrete published path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPipelineOutput {
    /// The externally visible output name.
    pub name: String,
    /// The published path, including any sub-path.
    pub path: String,
    /// Human-readable description carried from the declaration.
    pub description: String,
    /// External alias carried from the declaration.
    pub alias: Option<String>,
}

/// The complete record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// True when every task completed and merged cleanly.
    pub success: bool,
    /// Per-task outcomes, keyed by task id.
    pub tasks: HashMap<String, TaskRunResult>,
    /// Everything that went wrong, in discovery order.
    pub failures: Vec<RunFailure>,
    /// Resolved pipeline outputs; populated only on success.
    pub outputs: Vec<ResolvedPipelineOutput>,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: f64,
}

impl RunResult {
    pub(crate) fn new(run_id: Uuid, pipeline: &str) -> Self {
        Self {
            run_id,
            pipeline: pipeline.to_string(),
            success: true,
            tasks: HashMap::new(),
            failures: Vec::new(),
            outputs: Vec::new(),
            duration_ms: 0.0,
        }
    }

    /// Looks up one task's outcome.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TaskRunResult> {
        self.tasks.get(id)
    }

    /// Looks up one resolved pipeline output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&ResolvedPipelineOutput> {
        self.outputs.iter().find(|output| output.name == name)
    }
}
