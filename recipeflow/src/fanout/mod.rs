//! Dynamic fan-out of a task over a runtime-computed collection.
//!
//! A [`FanOutBinding`] annotates a task descriptor with the collection
//! slot it iterates, a per-item sub-folder template, and per-item
//! sub-path templates for its inputs. The [`FanOutResolver`] expands
//! the descriptor into one [`TaskInstance`] per item once the upstream
//! collection is known; the instance count is never assumed at graph
//! definition time.

use crate::core::CollectionItem;
use crate::errors::{InstanceExecutionError, RecipeflowError, TemplateError};
use crate::executor::ExecutorRef;
use crate::graph::{DependencyGraph, InputBinding, InputSource, TaskDescriptor};
use crate::params::ParameterValue;
use crate::template::PathTemplate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fan-out annotation on a task descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutBinding {
    /// The task producing the collection to iterate.
    pub loop_task: String,
    /// The collection output slot on that task.
    pub loop_output: String,
    /// Per-item sub-folder the instance writes into, e.g.
    /// `initial_results/{{item.identifier}}`.
    pub sub_folder: Option<PathTemplate>,
    /// Per-input sub-path templates, keyed by input name. Duplicate
    /// keys are rejected at definition time.
    pub sub_paths: Vec<(String, PathTemplate)>,
}

impl FanOutBinding {
    /// Creates a binding iterating the given task's collection slot.
    #[must_use]
    pub fn over(loop_task: impl Into<String>, loop_output: impl Into<String>) -> Self {
        Self {
            loop_task: loop_task.into(),
            loop_output: loop_output.into(),
            sub_folder: None,
            sub_paths: Vec::new(),
        }
    }

    /// Sets the per-item sub-folder template.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` if the template does not
    /// parse.
    pub fn with_sub_folder(mut self, template: impl Into<String>) -> Result<Self, TemplateError> {
        self.sub_folder = Some(PathTemplate::parse(template)?);
        Ok(self)
    }

    /// Adds a per-item sub-path template for one input.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTemplateKey` when the input already has a
    /// sub-path in this binding, or `InvalidTemplateSubstitution` if
    /// the template does not parse. Redefining a key is treated as an
    /// authoring mistake rather than last-one-wins.
    pub fn sub_path(
        mut self,
        input: impl Into<String>,
        template: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let input = input.into();
        if self.sub_paths.iter().any(|(key, _)| *key == input) {
            return Err(TemplateError::DuplicateTemplateKey { key: input });
        }
        self.sub_paths.push((input, PathTemplate::parse(template)?));
        Ok(self)
    }

    fn sub_path_for(&self, input: &str) -> Option<&PathTemplate> {
        self.sub_paths
            .iter()
            .find(|(key, _)| key == input)
            .map(|(_, template)| template)
    }
}

/// A concrete, fully-resolved input value handed to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ResolvedValue {
    /// A scalar value.
    Scalar(ParameterValue),
    /// A pipeline-relative artifact path.
    Path(String),
}

/// One resolved input of a task instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedInput {
    /// The declared input name.
    pub name: String,
    /// The resolved value.
    pub value: ResolvedValue,
}

/// One runnable instance of a task.
///
/// Instances of the same fan-out share no state: each reads only its
/// own templated inputs and writes only to its own sub-folder, so the
/// host may run them concurrently, sequentially, or in any
/// interleaving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    /// Unique id of this instance within the run.
    pub instance_id: Uuid,
    /// The task this instance belongs to.
    pub task: String,
    /// The external executable reference.
    pub executor: ExecutorRef,
    /// The collection item this instance was fanned out for, if any.
    pub item: Option<CollectionItem>,
    /// The per-item sub-folder the instance writes into.
    pub sub_folder: Option<String>,
    /// Fully-resolved inputs in declaration order.
    pub inputs: Vec<ResolvedInput>,
}

impl TaskInstance {
    /// Looks up a resolved input value by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&ResolvedValue> {
        self.inputs
            .iter()
            .find(|input| input.name == name)
            .map(|input| &input.value)
    }

    /// The item identifier, when fanned out.
    #[must_use]
    pub fn item_id(&self) -> Option<&str> {
        self.item.as_ref().map(|item| item.identifier.as_str())
    }
}

/// The outcome of expanding one fan-out binding.
///
/// A malformed substitution aborts only the affected item; siblings
/// still appear in `instances`.
#[derive(Debug, Clone)]
pub struct FanOutResolution {
    /// Successfully resolved instances, in item order.
    pub instances: Vec<TaskInstance>,
    /// Per-item resolution failures.
    pub failures: Vec<InstanceExecutionError>,
}

/// Expands task descriptors into concrete instances against a graph.
#[derive(Debug, Clone, Copy)]
pub struct FanOutResolver<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> FanOutResolver<'g> {
    /// Creates a resolver over the given graph.
    #[must_use]
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Resolves a non-fanned task into its single instance.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter reference has no value or a
    /// template unexpectedly fails to render.
    pub fn resolve_single(&self, task: &TaskDescriptor) -> Result<TaskInstance, RecipeflowError> {
        let mut inputs = Vec::with_capacity(task.inputs.len());
        for binding in &task.inputs {
            inputs.push(self.resolve_input(task, binding, None)?);
        }
        Ok(TaskInstance {
            instance_id: crate::utils::generate_uuid(),
            task: task.id.clone(),
            executor: task.executor.clone(),
            item: None,
            sub_folder: None,
            inputs,
        })
    }

    /// Expands a fanned-out task over the runtime collection.
    ///
    /// Produces exactly one instance per item, minus items whose
    /// substitution failed; those are reported as per-item failures
    /// without affecting siblings. A zero-length collection yields
    /// zero instances and zero failures.
    ///
    /// # Errors
    ///
    /// Returns a task-level error only for problems independent of any
    /// item, such as a parameter reference with no bound value.
    pub fn resolve(
        &self,
        task: &TaskDescriptor,
        items: &[CollectionItem],
    ) -> Result<FanOutResolution, RecipeflowError> {
        let mut instances = Vec::with_capacity(items.len());
        let mut failures = Vec::new();

        for item in items {
            match self.resolve_instance(task, item) {
                Ok(instance) => instances.push(instance),
                Err(RecipeflowError::Template(err)) => {
                    failures.push(InstanceExecutionError::instance(
                        &task.id,
                        &item.identifier,
                        err.to_string(),
                    ));
                }
                Err(other) => return Err(other),
            }
        }

        Ok(FanOutResolution {
            instances,
            failures,
        })
    }

    fn resolve_instance(
        &self,
        task: &TaskDescriptor,
        item: &CollectionItem,
    ) -> Result<TaskInstance, RecipeflowError> {
        let mut inputs = Vec::with_capacity(task.inputs.len());
        for binding in &task.inputs {
            inputs.push(self.resolve_input(task, binding, Some(item))?);
        }
        let sub_folder = task
            .fan_out
            .as_ref()
            .and_then(|fan_out| fan_out.sub_folder.as_ref())
            .map(|template| template.substitute(item))
            .transpose()
            .map_err(RecipeflowError::Template)?;

        Ok(TaskInstance {
            instance_id: crate::utils::generate_uuid(),
            task: task.id.clone(),
            executor: task.executor.clone(),
            item: Some(item.clone()),
            sub_folder,
            inputs,
        })
    }

    fn resolve_input(
        &self,
        task: &TaskDescriptor,
        binding: &InputBinding,
        item: Option<&CollectionItem>,
    ) -> Result<ResolvedInput, RecipeflowError> {
        let value = match &binding.source {
            InputSource::Parameter(parameter) => {
                let value = self.graph.params().value(parameter).ok_or_else(|| {
                    RecipeflowError::Internal(format!(
                        "parameter '{parameter}' has no bound value or default"
                    ))
                })?;
                match value {
                    ParameterValue::File(path) => ResolvedValue::Path(path.clone()),
                    scalar => ResolvedValue::Scalar(scalar.clone()),
                }
            }
            InputSource::TaskOutput {
                task: upstream,
                output,
            } => {
                let base = self
                    .graph
                    .task(upstream)
                    .and_then(|candidate| candidate.output(output))
                    .map(|slot| slot.published_path().to_string())
                    .ok_or_else(|| {
                        RecipeflowError::Internal(format!(
                            "unresolved upstream output '{upstream}.{output}'"
                        ))
                    })?;

                let per_item = task
                    .fan_out
                    .as_ref()
                    .and_then(|fan_out| fan_out.sub_path_for(&binding.name));
                let sub_path = per_item.or(binding.sub_path.as_ref());
                match sub_path {
                    Some(template) => {
                        let rendered = self.render(template, item)?;
                        ResolvedValue::Path(format!("{base}/{rendered}"))
                    }
                    None => ResolvedValue::Path(base),
                }
            }
            InputSource::Value(value) => match value {
                ParameterValue::File(path) => ResolvedValue::Path(path.clone()),
                scalar => ResolvedValue::Scalar(scalar.clone()),
            },
            InputSource::Template(template) => {
                let rendered = self.render(template, item)?;
                ResolvedValue::Scalar(ParameterValue::String(rendered))
            }
        };

        Ok(ResolvedInput {
            name: binding.name.clone(),
            value,
        })
    }

    fn render(
        &self,
        template: &PathTemplate,
        item: Option<&CollectionItem>,
    ) -> Result<String, RecipeflowError> {
        match item {
            Some(item) => template.substitute(item).map_err(RecipeflowError::Template),
            None if template.is_static() => Ok(template.raw().to_string()),
            None => Err(RecipeflowError::Internal(format!(
                "item template '{}' rendered without an item",
                template.raw()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, OutputSource, PipelineOutput, SlotKind};
    use crate::params::{ParameterDecl, ParameterSet};
    use pretty_assertions::assert_eq;

    fn grid_graph() -> DependencyGraph {
        let mut params = ParameterSet::new();
        params
            .declare(
                ParameterDecl::string("radiance_parameters")
                    .with_default(ParameterValue::String("-ab 2 -ad 5000".to_string())),
            )
            .unwrap();

        let mut builder = GraphBuilder::new("grid", params);
        builder
            .add_task(
                TaskDescriptor::builder("prepare", ExecutorRef::new("prepare-folder"))
                    .output_as("resources", SlotKind::Folder, "resources")
                    .output("sensor_grids", SlotKind::Collection)
                    .build(),
            )
            .unwrap();

        let fan_out = FanOutBinding::over("prepare", "sensor_grids")
            .with_sub_folder("initial_results/{{item.identifier}}")
            .unwrap()
            .sub_path("sensor_grid", "grid/{{item.identifier}}.pts")
            .unwrap();
        builder
            .add_task(
                TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
                    .input_param("radiance_parameters", "radiance_parameters")
                    .input_from("sensor_grid", "prepare", "resources")
                    .input_template("sensor_count", "{{item.count}}")
                    .unwrap()
                    .output("results", SlotKind::Folder)
                    .fan_out(fan_out)
                    .build(),
            )
            .unwrap();
        builder
            .expose_output(PipelineOutput::new(
                "results",
                OutputSource::slot("trace", "results"),
            ))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_duplicate_sub_path_key_rejected() {
        let err = FanOutBinding::over("prepare", "sensor_grids")
            .sub_path("sensor_grid", "{{item.identifier}}.pts")
            .unwrap()
            .sub_path("sensor_grid", "grid/{{item.identifier}}.pts")
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::DuplicateTemplateKey {
                key: "sensor_grid".to_string()
            }
        );
    }

    #[test]
    fn test_instance_count_matches_collection() {
        let graph = grid_graph();
        let task = graph.task("trace").unwrap();
        let resolver = FanOutResolver::new(&graph);

        let items = vec![CollectionItem::new("A", 10), CollectionItem::new("B", 3)];
        let resolution = resolver.resolve(task, &items).unwrap();
        assert_eq!(resolution.instances.len(), 2);
        assert!(resolution.failures.is_empty());
    }

    #[test]
    fn test_zero_items_produce_zero_instances() {
        let graph = grid_graph();
        let task = graph.task("trace").unwrap();
        let resolver = FanOutResolver::new(&graph);

        let resolution = resolver.resolve(task, &[]).unwrap();
        assert!(resolution.instances.is_empty());
        assert!(resolution.failures.is_empty());
    }

    #[test]
    fn test_per_item_path_substitution() {
        let graph = grid_graph();
        let task = graph.task("trace").unwrap();
        let resolver = FanOutResolver::new(&graph);

        let items = vec![CollectionItem::new("A", 10), CollectionItem::new("B", 3)];
        let resolution = resolver.resolve(task, &items).unwrap();

        let first = &resolution.instances[0];
        assert_eq!(first.item_id(), Some("A"));
        assert_eq!(first.sub_folder.as_deref(), Some("initial_results/A"));
        assert_eq!(
            first.input("sensor_grid"),
            Some(&ResolvedValue::Path("resources/grid/A.pts".to_string()))
        );
        assert_eq!(
            first.input("sensor_count"),
            Some(&ResolvedValue::Scalar(ParameterValue::String(
                "10".to_string()
            )))
        );

        let second = &resolution.instances[1];
        assert_eq!(
            second.input("sensor_grid"),
            Some(&ResolvedValue::Path("resources/grid/B.pts".to_string()))
        );
    }

    #[test]
    fn test_static_inputs_copied_verbatim() {
        let graph = grid_graph();
        let task = graph.task("trace").unwrap();
        let resolver = FanOutResolver::new(&graph);

        let items = vec![CollectionItem::new("A", 10)];
        let resolution = resolver.resolve(task, &items).unwrap();
        assert_eq!(
            resolution.instances[0].input("radiance_parameters"),
            Some(&ResolvedValue::Scalar(ParameterValue::String(
                "-ab 2 -ad 5000".to_string()
            )))
        );
    }

    #[test]
    fn test_substitution_failure_aborts_only_that_instance() {
        let graph = grid_graph();
        let mut task = graph.task("trace").unwrap().clone();
        // Simulate an item attribute the shape check could not catch,
        // as with collections provided by an external orchestrator.
        if let Some(fan_out) = task.fan_out.as_mut() {
            fan_out.sub_paths[0].1 = PathTemplate::parse("grid/{{item.full_id}}.pts").unwrap();
        }
        let resolver = FanOutResolver::new(&graph);

        let items = vec![CollectionItem::new("A", 10), CollectionItem::new("B", 3)];
        let resolution = resolver.resolve(&task, &items).unwrap();

        // Both items hit the same bad template here, so both fail; the
        // point is that each failure is recorded per item rather than
        // aborting the expansion.
        assert!(resolution.instances.is_empty());
        assert_eq!(resolution.failures.len(), 2);
        assert_eq!(resolution.failures[0].item.as_deref(), Some("A"));
        assert_eq!(resolution.failures[1].item.as_deref(), Some("B"));
    }

    #[test]
    fn test_resolve_single_for_non_fanned_task() {
        let graph = grid_graph();
        let task = graph.task("prepare").unwrap();
        let resolver = FanOutResolver::new(&graph);

        let instance = resolver.resolve_single(task).unwrap();
        assert!(instance.item.is_none());
        assert!(instance.sub_folder.is_none());
    }
}
