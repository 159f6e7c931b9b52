//! Graph builder with stepwise validation.
//!
//! Construction is all-or-nothing: every `add_task` and
//! `expose_output` call validates against what is already present and
//! leaves the builder unchanged on error, so a pipeline is never
//! partially built.

use super::{DependencyGraph, InputSource, PipelineOutput, SlotKind, TaskDescriptor};
use crate::errors::{GraphError, TemplateError};
use crate::params::ParameterSet;
use std::collections::HashSet;

/// Builder for [`DependencyGraph`].
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    name: String,
    params: ParameterSet,
    tasks: Vec<TaskDescriptor>,
    ids: HashSet<String>,
    outputs: Vec<PipelineOutput>,
}

impl GraphBuilder {
    /// Creates a builder over the given parameter set.
    ///
    /// The set's declarations are what input bindings of kind
    /// `Parameter` resolve against.
    #[must_use]
    pub fn new(name: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            name: name.into(),
            params,
            tasks: Vec::new(),
            ids: HashSet::new(),
            outputs: Vec::new(),
        }
    }

    /// Adds a task to the graph.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTask` for a repeated id, `UnresolvedInput`
    /// when a binding references an undeclared parameter or a task or
    /// slot not yet present (no forward references), `DuplicateInput`
    /// for a repeated input name, `InvalidLoopSource` when a fan-out
    /// loop source is not an already-added task's collection slot, and
    /// template errors for placeholders that reference unknown item
    /// attributes or appear outside a fan-out binding.
    pub fn add_task(&mut self, task: TaskDescriptor) -> Result<(), GraphError> {
        if self.ids.contains(&task.id) {
            return Err(GraphError::DuplicateTask {
                task: task.id.clone(),
            });
        }

        let mut input_names = HashSet::new();
        for binding in &task.inputs {
            if !input_names.insert(binding.name.as_str()) {
                return Err(GraphError::DuplicateInput {
                    task: task.id.clone(),
                    input: binding.name.clone(),
                });
            }
            self.validate_source(&task, binding.name.as_str(), &binding.source)?;

            if let Some(sub_path) = &binding.sub_path {
                sub_path.validate_attributes()?;
                if !sub_path.is_static() {
                    return Err(TemplateError::InvalidTemplateSubstitution {
                        template: sub_path.raw().to_string(),
                        reason: "per-item sub-paths belong on the fan-out binding".to_string(),
                    }
                    .into());
                }
            }
        }

        if let Some(fan_out) = &task.fan_out {
            self.validate_fan_out(&task, fan_out, &input_names)?;
        }

        self.ids.insert(task.id.clone());
        self.tasks.push(task);
        Ok(())
    }

    /// Exposes a task output slot as a pipeline-level output.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOutputSource` when the source task or slot does
    /// not exist, and `DuplicatePipelineOutput` for a repeated name.
    pub fn expose_output(&mut self, output: PipelineOutput) -> Result<(), GraphError> {
        if self.outputs.iter().any(|existing| existing.name == output.name) {
            return Err(GraphError::DuplicatePipelineOutput {
                output: output.name.clone(),
            });
        }
        let source_exists = self
            .tasks
            .iter()
            .find(|task| task.id == output.source.task)
            .is_some_and(|task| task.output(&output.source.slot).is_some());
        if !source_exists {
            return Err(GraphError::UnknownOutputSource {
                output: output.name.clone(),
                source_ref: format!("{}.{}", output.source.task, output.source.slot),
            });
        }
        self.outputs.push(output);
        Ok(())
    }

    /// Finishes the graph, re-validating acyclicity defensively.
    ///
    /// # Errors
    ///
    /// Returns `EmptyGraph` for a graph with no tasks, or
    /// `CycleDetected` should a future extension ever break the
    /// no-forward-reference invariant.
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        if self.tasks.is_empty() {
            return Err(GraphError::EmptyGraph);
        }
        let graph = DependencyGraph::new(self.name, self.params, self.tasks, self.outputs);
        graph.topological_order()?;
        Ok(graph)
    }

    /// The number of tasks added so far.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn validate_source(
        &self,
        task: &TaskDescriptor,
        input: &str,
        source: &InputSource,
    ) -> Result<(), GraphError> {
        match source {
            InputSource::Parameter(parameter) => {
                if self.params.declaration(parameter).is_none() {
                    return Err(GraphError::UnresolvedInput {
                        task: task.id.clone(),
                        input: input.to_string(),
                        reference: format!("parameter '{parameter}'"),
                    });
                }
            }
            InputSource::TaskOutput {
                task: upstream,
                output,
            } => {
                let resolved = self
                    .tasks
                    .iter()
                    .find(|candidate| candidate.id == *upstream)
                    .is_some_and(|candidate| candidate.output(output).is_some());
                if !resolved {
                    return Err(GraphError::UnresolvedInput {
                        task: task.id.clone(),
                        input: input.to_string(),
                        reference: format!("output '{upstream}.{output}'"),
                    });
                }
            }
            InputSource::Value(_) => {}
            InputSource::Template(template) => {
                template.validate_attributes()?;
                if !template.is_static() && task.fan_out.is_none() {
                    return Err(TemplateError::InvalidTemplateSubstitution {
                        template: template.raw().to_string(),
                        reason: "item placeholder on a task without a fan-out binding"
                            .to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn validate_fan_out(
        &self,
        task: &TaskDescriptor,
        fan_out: &crate::fanout::FanOutBinding,
        input_names: &HashSet<&str>,
    ) -> Result<(), GraphError> {
        let loop_slot = self
            .tasks
            .iter()
            .find(|candidate| candidate.id == fan_out.loop_task)
            .and_then(|candidate| candidate.output(&fan_out.loop_output));
        match loop_slot {
            None => {
                return Err(GraphError::InvalidLoopSource {
                    task: task.id.clone(),
                    reason: format!(
                        "'{}.{}' is not an output of an already-added task",
                        fan_out.loop_task, fan_out.loop_output
                    ),
                });
            }
            Some(slot) if slot.kind != SlotKind::Collection => {
                return Err(GraphError::InvalidLoopSource {
                    task: task.id.clone(),
                    reason: format!(
                        "'{}.{}' is a {:?} slot, not a dynamic collection",
                        fan_out.loop_task, fan_out.loop_output, slot.kind
                    ),
                });
            }
            Some(_) => {}
        }

        if let Some(sub_folder) = &fan_out.sub_folder {
            sub_folder.validate_attributes()?;
        }
        for (key, template) in &fan_out.sub_paths {
            if !input_names.contains(key.as_str()) {
                return Err(GraphError::UnresolvedInput {
                    task: task.id.clone(),
                    input: key.clone(),
                    reference: format!("sub-path key '{key}' matches no declared input"),
                });
            }
            template.validate_attributes()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorRef;
    use crate::fanout::FanOutBinding;
    use crate::params::{ParameterDecl, ParameterValue};

    fn params() -> ParameterSet {
        let mut params = ParameterSet::new();
        params
            .declare(
                ParameterDecl::string("radiance_parameters")
                    .with_default(ParameterValue::String("-ab 2".to_string())),
            )
            .unwrap();
        params
    }

    fn prepare_task() -> TaskDescriptor {
        TaskDescriptor::builder("prepare", ExecutorRef::new("prepare-folder"))
            .output("resources", SlotKind::Folder)
            .output("sensor_grids", SlotKind::Collection)
            .build()
    }

    #[test]
    fn test_add_task_and_build() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        assert_eq!(builder.task_count(), 1);
        let graph = builder.build().unwrap();
        assert_eq!(graph.task_count(), 1);
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        let err = builder.add_task(prepare_task()).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTask { .. }));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut builder = GraphBuilder::new("test", params());
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_from("resources", "prepare", "resources")
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedInput { .. }));
        // All-or-nothing: nothing was added.
        assert_eq!(builder.task_count(), 0);
    }

    #[test]
    fn test_unknown_parameter_reference_rejected() {
        let mut builder = GraphBuilder::new("test", params());
        let task = TaskDescriptor::builder("prepare", ExecutorRef::new("prepare-folder"))
            .input_param("north", "north")
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedInput { .. }));
    }

    #[test]
    fn test_unknown_slot_reference_rejected() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_from("octree", "prepare", "octree_file")
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedInput { .. }));
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_from("resources", "prepare", "resources")
            .input_from("resources", "prepare", "resources")
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateInput { .. }));
    }

    #[test]
    fn test_loop_source_must_be_collection() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_from("resources", "prepare", "resources")
            .fan_out(FanOutBinding::over("prepare", "resources"))
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::InvalidLoopSource { .. }));
    }

    #[test]
    fn test_item_placeholder_requires_fan_out() {
        let mut builder = GraphBuilder::new("test", params());
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_template("grid_name", "{{item.identifier}}")
            .unwrap()
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::Template(_)));
    }

    #[test]
    fn test_sub_path_key_must_match_input() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();
        let binding = FanOutBinding::over("prepare", "sensor_grids")
            .sub_path("sensor_grid", "grid/{{item.identifier}}.pts")
            .unwrap();
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_from("resources", "prepare", "resources")
            .fan_out(binding)
            .build();
        let err = builder.add_task(task).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedInput { .. }));
    }

    #[test]
    fn test_expose_output_validation() {
        let mut builder = GraphBuilder::new("test", params());
        builder.add_task(prepare_task()).unwrap();

        builder
            .expose_output(PipelineOutput::new(
                "resources",
                super::super::OutputSource::slot("prepare", "resources"),
            ))
            .unwrap();

        let err = builder
            .expose_output(PipelineOutput::new(
                "missing",
                super::super::OutputSource::slot("prepare", "nope"),
            ))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownOutputSource { .. }));

        let err = builder
            .expose_output(PipelineOutput::new(
                "resources",
                super::super::OutputSource::slot("prepare", "resources"),
            ))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePipelineOutput { .. }));
    }

    #[test]
    fn test_empty_graph_rejected() {
        let builder = GraphBuilder::new("test", params());
        assert!(matches!(builder.build(), Err(GraphError::EmptyGraph)));
    }
}
