//! Pipeline run engine.
//!
//! Walks the graph in topological order, expands fan-out bindings
//! against runtime collections, dispatches instances to the external
//! executor with maximum parallelism inside each fan-out, and merges
//! per-item outputs before any consumer proceeds. Scheduling across
//! machines belongs to the host orchestrator; this engine only
//! enforces the partial order and instance isolation.

mod result;

pub use result::{
    InstanceResult, ResolvedPipelineOutput, RunFailure, RunResult, TaskRunResult,
};

use crate::aggregate::{InstanceOutcome, OutputAggregator};
use crate::cancellation::CancellationToken;
use crate::core::{CollectionItem, InstanceStatus, OutputValue};
use crate::errors::{InstanceExecutionError, ParameterError, RecipeflowError};
use crate::executor::{TaskExecutor, TaskOutputs};
use crate::fanout::{FanOutResolver, TaskInstance};
use crate::graph::{DependencyGraph, SlotKind, TaskDescriptor};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executes dependency graphs against an external task executor.
#[derive(Debug, Clone)]
pub struct RunEngine {
    executor: Arc<dyn TaskExecutor>,
    token: Arc<CancellationToken>,
}

impl RunEngine {
    /// Creates an engine over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Uses a shared cancellation token, so a host can cancel the run
    /// from outside.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// The engine's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.token)
    }

    /// Runs the graph to completion, failure, or cancellation.
    ///
    /// A task starts only after every producer of its inputs has fully
    /// completed, including all instances of fanned-out producers. The
    /// run stops launching new work after the first task-level failure
    /// or cancellation, but everything gathered up to that point stays
    /// inspectable on the returned [`RunResult`].
    ///
    /// # Errors
    ///
    /// Returns an error only for definition-level problems surfacing
    /// late: unbound required parameters or a graph that fails its
    /// defensive topological re-validation. Execution failures are
    /// reported on the `RunResult` instead.
    pub async fn run(&self, graph: &DependencyGraph) -> Result<RunResult, RecipeflowError> {
        let start = Instant::now();
        let run_id = crate::utils::generate_uuid();

        let missing = graph.params().missing_required();
        if let Some(name) = missing.first() {
            return Err(ParameterError::MissingRequired {
                name: (*name).to_string(),
            }
            .into());
        }

        let order = graph.topological_order().map_err(RecipeflowError::Graph)?;
        info!(%run_id, pipeline = graph.name(), tasks = order.len(), "run started");

        let mut result = RunResult::new(run_id, graph.name());
        // Runtime outputs of completed tasks, keyed by task id then slot.
        let mut completed: HashMap<String, TaskOutputs> = HashMap::new();

        for task_id in &order {
            if self.token.is_cancelled() {
                let reason = self.token.reason().unwrap_or_default();
                warn!(%run_id, task = %task_id, "run cancelled before task start");
                result.failures.push(RunFailure::Cancelled {
                    task: task_id.clone(),
                    reason,
                });
                result.success = false;
                break;
            }

            let task = graph.task(task_id).ok_or_else(|| {
                RecipeflowError::Internal(format!("task '{task_id}' missing from graph"))
            })?;

            let task_result = if task.fan_out.is_some() {
                self.run_fanned_task(graph, task, &completed, &mut result)
                    .await?
            } else {
                self.run_single_task(graph, task, &mut result).await?
            };

            let succeeded = task_result.status.is_success();
            if succeeded {
                completed.insert(task_id.clone(), task_result.published_outputs());
            }
            result.tasks.insert(task_id.clone(), task_result);

            if !succeeded {
                result.success = false;
                break;
            }
        }

        if result.success {
            result.outputs = resolve_pipeline_outputs(graph);
            info!(%run_id, "run completed");
        } else {
            warn!(%run_id, failures = result.failures.len(), "run failed");
        }
        result.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(result)
    }

    /// Executes a non-fanned task as a single instance.
    async fn run_single_task(
        &self,
        graph: &DependencyGraph,
        task: &TaskDescriptor,
        result: &mut RunResult,
    ) -> Result<TaskRunResult, RecipeflowError> {
        let resolver = FanOutResolver::new(graph);
        let instance = resolver.resolve_single(task)?;

        debug!(task = %task.id, instance = %instance.instance_id, "dispatching task");
        let outcome = self.execute_instance(instance).await?;

        let mut task_result = TaskRunResult::new(&task.id);
        if let Some(error) = &outcome.error {
            result
                .failures
                .push(RunFailure::Instance(InstanceExecutionError::task(
                    &task.id, error,
                )));
            task_result.status = InstanceStatus::Fail;
        } else {
            task_result.status = InstanceStatus::Ok;
        }
        task_result.instances.push(outcome);
        Ok(task_result)
    }

    /// Expands and executes a fanned-out task, then merges per-item
    /// outputs for every non-collection slot it declares.
    async fn run_fanned_task(
        &self,
        graph: &DependencyGraph,
        task: &TaskDescriptor,
        completed: &HashMap<String, TaskOutputs>,
        result: &mut RunResult,
    ) -> Result<TaskRunResult, RecipeflowError> {
        let mut task_result = TaskRunResult::new(&task.id);

        let Some(items) = self.loop_items(task, completed) else {
            let error = InstanceExecutionError::task(
                &task.id,
                "loop source did not produce a collection",
            );
            result.failures.push(RunFailure::Instance(error));
            task_result.status = InstanceStatus::Fail;
            return Ok(task_result);
        };
        let expected_ids: Vec<String> = items
            .iter()
            .map(|item| item.identifier.clone())
            .collect();

        let resolver = FanOutResolver::new(graph);
        let resolution = resolver.resolve(task, &items)?;
        debug!(
            task = %task.id,
            instances = resolution.instances.len(),
            "fan-out expanded"
        );

        // Resolution failures abort only their own item.
        for failure in resolution.failures {
            task_result
                .instances
                .push(InstanceResult::failed_item(&failure));
            result.failures.push(RunFailure::Instance(failure));
        }

        // Dispatch surviving instances fully in parallel; the token is
        // re-checked between dispatches so cancellation stops further
        // launches while in-flight instances run to completion.
        let mut active = FuturesUnordered::new();
        for instance in resolution.instances {
            if self.token.is_cancelled() {
                let reason = self.token.reason().unwrap_or_default();
                task_result.instances.push(InstanceResult::cancelled(
                    &instance,
                    &reason,
                ));
                result.failures.push(RunFailure::Cancelled {
                    task: task.id.clone(),
                    reason,
                });
                continue;
            }
            let executor = Arc::clone(&self.executor);
            active.push(tokio::spawn(async move {
                execute_with(executor, instance).await
            }));
        }

        while let Some(joined) = active.next().await {
            let outcome = joined
                .map_err(|err| RecipeflowError::Internal(format!("task join error: {err}")))?;
            if let Some(error) = &outcome.error {
                result.failures.push(RunFailure::Instance(
                    match &outcome.item {
                        Some(item) => InstanceExecutionError::instance(&task.id, item, error),
                        None => InstanceExecutionError::task(&task.id, error),
                    },
                ));
            }
            task_result.instances.push(outcome);
        }

        // Every instance is terminal; merge per-slot outputs keyed by
        // item id before any consumer may proceed.
        let outcomes_by_item = outcomes_by_item(&task_result.instances);
        let mut all_merged = true;
        for slot in &task.outputs {
            if slot.kind == SlotKind::Collection {
                continue;
            }
            let per_slot =
                narrow_to_slot(&task_result.instances, &slot.name, outcomes_by_item.clone());

            match OutputAggregator::merge(
                &task.id,
                &slot.name,
                slot.published_path(),
                &expected_ids,
                &per_slot,
            ) {
                Ok(merged) => {
                    task_result.merged.insert(slot.name.clone(), merged);
                }
                Err(err) => {
                    all_merged = false;
                    result.failures.push(RunFailure::Aggregation(err));
                }
            }
        }

        let any_failed = task_result
            .instances
            .iter()
            .any(|instance| instance.error.is_some());
        task_result.status = if all_merged && !any_failed {
            InstanceStatus::Ok
        } else {
            InstanceStatus::Fail
        };
        Ok(task_result)
    }

    fn loop_items(
        &self,
        task: &TaskDescriptor,
        completed: &HashMap<String, TaskOutputs>,
    ) -> Option<Vec<CollectionItem>> {
        let fan_out = task.fan_out.as_ref()?;
        completed
            .get(&fan_out.loop_task)
            .and_then(|outputs| outputs.get(&fan_out.loop_output))
            .and_then(OutputValue::as_collection)
            .map(<[CollectionItem]>::to_vec)
    }

    async fn execute_instance(
        &self,
        instance: TaskInstance,
    ) -> Result<InstanceResult, RecipeflowError> {
        Ok(execute_with(Arc::clone(&self.executor), instance).await)
    }
}

/// Runs one instance and captures its terminal state.
async fn execute_with(executor: Arc<dyn TaskExecutor>, instance: TaskInstance) -> InstanceResult {
    let started = Instant::now();
    let outcome = executor.execute(&instance).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(outputs) => InstanceResult {
            instance_id: instance.instance_id,
            item: instance.item.map(|item| item.identifier),
            status: InstanceStatus::Ok,
            outputs,
            error: None,
            duration_ms,
        },
        Err(err) => InstanceResult {
            instance_id: instance.instance_id,
            item: instance.item.map(|item| item.identifier),
            status: InstanceStatus::Fail,
            outputs: TaskOutputs::new(),
            error: Some(err.to_string()),
            duration_ms,
        },
    }
}

/// Collapses instance results into one terminal outcome per item id.
fn outcomes_by_item(instances: &[InstanceResult]) -> HashMap<String, InstanceOutcome> {
    instances
        .iter()
        .filter_map(|instance| {
            let item = instance.item.clone()?;
            let outcome = match (&instance.error, instance.status) {
                (Some(error), _) => InstanceOutcome::Failed(error.clone()),
                (None, InstanceStatus::Cancel) => {
                    InstanceOutcome::Failed("cancelled".to_string())
                }
                (None, _) => InstanceOutcome::Completed(OutputValue::Empty),
            };
            Some((item, outcome))
        })
        .collect()
}

/// Replaces the placeholder completed values with the slot-specific
/// output each instance actually reported.
fn narrow_to_slot(
    instances: &[InstanceResult],
    slot: &str,
    mut outcomes: HashMap<String, InstanceOutcome>,
) -> HashMap<String, InstanceOutcome> {
    for instance in instances {
        let Some(item) = &instance.item else { continue };
        if instance.error.is_none() && instance.status.is_success() {
            let value = instance
                .outputs
                .get(slot)
                .cloned()
                .unwrap_or(OutputValue::Empty);
            outcomes.insert(item.clone(), InstanceOutcome::Completed(value));
        }
    }
    outcomes
}

/// Maps exposed pipeline outputs to their concrete published paths.
fn resolve_pipeline_outputs(graph: &DependencyGraph) -> Vec<ResolvedPipelineOutput> {
    graph
        .outputs()
        .iter()
        .filter_map(|output| {
            let base = graph
                .task(&output.source.task)
                .and_then(|task| task.output(&output.source.slot))
                .map(|slot| slot.published_path().to_string())?;
            let path = match &output.source.sub_path {
                Some(sub_path) => format!("{base}/{sub_path}"),
                None => base,
            };
            Some(ResolvedPipelineOutput {
                name: output.name.clone(),
                path,
                description: output.description.clone(),
                alias: output.alias.clone(),
            })
        })
        .collect()
}
