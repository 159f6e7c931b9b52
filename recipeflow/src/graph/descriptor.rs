//! Task descriptor types and their builder.

use crate::errors::TemplateError;
use crate::executor::ExecutorRef;
use crate::fanout::FanOutBinding;
use crate::params::ParameterValue;
use crate::template::PathTemplate;
use serde::{Deserialize, Serialize};

/// The declared kind of a task output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// A single file.
    File,
    /// A folder of files.
    Folder,
    /// A runtime-sized collection of items; drives downstream fan-out.
    Collection,
}

/// A declared output slot, optionally republished under an external path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSlot {
    /// The slot name, unique within the task.
    pub name: String,
    /// What the slot holds.
    pub kind: SlotKind,
    /// The external path the slot is republished to. Defaults to the
    /// slot name when absent, matching a bare exposure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl OutputSlot {
    /// The path this slot is published under in the run folder.
    #[must_use]
    pub fn published_path(&self) -> &str {
        self.to.as_deref().unwrap_or(&self.name)
    }
}

/// Where an input binding gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// A declared pipeline parameter, referenced by name.
    Parameter(String),
    /// A named output slot of an upstream task.
    TaskOutput {
        /// The upstream task id.
        task: String,
        /// The upstream output slot name.
        output: String,
    },
    /// A literal value fixed at definition time.
    Value(ParameterValue),
    /// A templated literal, e.g. `{{item.count}}` on a fanned-out task.
    Template(PathTemplate),
}

/// One declared input of a task and where it is bound.
#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    /// The declared input name.
    pub name: String,
    /// The bound source.
    pub source: InputSource,
    /// Optional sub-path read out of a folder-valued source. Static
    /// here; per-item sub-paths live on the task's fan-out binding.
    pub sub_path: Option<PathTemplate>,
}

/// A named unit of work: input contract, output contract, and an
/// opaque reference to the external executable that performs it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    /// Unique id within the graph.
    pub id: String,
    /// The external executable resolved by the host orchestrator.
    pub executor: ExecutorRef,
    /// Input bindings in declaration order.
    pub inputs: Vec<InputBinding>,
    /// Output slots in declaration order.
    pub outputs: Vec<OutputSlot>,
    /// Fan-out annotation, when this task iterates a dynamic collection.
    pub fan_out: Option<FanOutBinding>,
}

impl TaskDescriptor {
    /// Starts building a descriptor.
    #[must_use]
    pub fn builder(id: impl Into<String>, executor: ExecutorRef) -> TaskDescriptorBuilder {
        TaskDescriptorBuilder {
            descriptor: Self {
                id: id.into(),
                executor,
                inputs: Vec::new(),
                outputs: Vec::new(),
                fan_out: None,
            },
        }
    }

    /// Looks up an input binding by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&InputBinding> {
        self.inputs.iter().find(|binding| binding.name == name)
    }

    /// Looks up an output slot by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|slot| slot.name == name)
    }

    /// The ids of upstream tasks this descriptor reads outputs from,
    /// including the fan-out loop source. May repeat.
    pub fn upstream_tasks(&self) -> impl Iterator<Item = &str> {
        let from_inputs = self.inputs.iter().filter_map(|binding| {
            if let InputSource::TaskOutput { task, .. } = &binding.source {
                Some(task.as_str())
            } else {
                None
            }
        });
        let from_loop = self
            .fan_out
            .iter()
            .map(|binding| binding.loop_task.as_str());
        from_inputs.chain(from_loop)
    }
}

/// Builder for [`TaskDescriptor`].
///
/// Methods that parse template text are fallible; the rest chain
/// infallibly. Cross-input validation (duplicate names, dangling
/// references) happens in [`super::GraphBuilder::add_task`].
#[derive(Debug, Clone)]
pub struct TaskDescriptorBuilder {
    descriptor: TaskDescriptor,
}

impl TaskDescriptorBuilder {
    /// Binds an input to a pipeline parameter.
    #[must_use]
    pub fn input_param(mut self, input: impl Into<String>, parameter: impl Into<String>) -> Self {
        self.descriptor.inputs.push(InputBinding {
            name: input.into(),
            source: InputSource::Parameter(parameter.into()),
            sub_path: None,
        });
        self
    }

    /// Binds an input to an upstream task's output slot.
    #[must_use]
    pub fn input_from(
        mut self,
        input: impl Into<String>,
        task: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.descriptor.inputs.push(InputBinding {
            name: input.into(),
            source: InputSource::TaskOutput {
                task: task.into(),
                output: output.into(),
            },
            sub_path: None,
        });
        self
    }

    /// Binds an input to a fixed sub-path within an upstream task's
    /// folder-valued output slot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` if the sub-path text does
    /// not parse.
    pub fn input_from_path(
        mut self,
        input: impl Into<String>,
        task: impl Into<String>,
        output: impl Into<String>,
        sub_path: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        self.descriptor.inputs.push(InputBinding {
            name: input.into(),
            source: InputSource::TaskOutput {
                task: task.into(),
                output: output.into(),
            },
            sub_path: Some(PathTemplate::parse(sub_path)?),
        });
        Ok(self)
    }

    /// Binds an input to a literal value.
    #[must_use]
    pub fn input_value(mut self, input: impl Into<String>, value: ParameterValue) -> Self {
        self.descriptor.inputs.push(InputBinding {
            name: input.into(),
            source: InputSource::Value(value),
            sub_path: None,
        });
        self
    }

    /// Binds an input to a templated literal such as `{{item.count}}`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemplateSubstitution` if the template does not
    /// parse.
    pub fn input_template(
        mut self,
        input: impl Into<String>,
        template: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        self.descriptor.inputs.push(InputBinding {
            name: input.into(),
            source: InputSource::Template(PathTemplate::parse(template)?),
            sub_path: None,
        });
        Ok(self)
    }

    /// Declares an output slot published under its own name.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, kind: SlotKind) -> Self {
        self.descriptor.outputs.push(OutputSlot {
            name: name.into(),
            kind,
            to: None,
        });
        self
    }

    /// Declares an output slot republished under an external path.
    #[must_use]
    pub fn output_as(
        mut self,
        name: impl Into<String>,
        kind: SlotKind,
        to: impl Into<String>,
    ) -> Self {
        self.descriptor.outputs.push(OutputSlot {
            name: name.into(),
            kind,
            to: Some(to.into()),
        });
        self
    }

    /// Attaches a fan-out binding.
    #[must_use]
    pub fn fan_out(mut self, binding: FanOutBinding) -> Self {
        self.descriptor.fan_out = Some(binding);
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> TaskDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_path_defaults_to_slot_name() {
        let slot = OutputSlot {
            name: "sensor_grids".to_string(),
            kind: SlotKind::Collection,
            to: None,
        };
        assert_eq!(slot.published_path(), "sensor_grids");
    }

    #[test]
    fn test_builder_wires_inputs_and_outputs() {
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_param("radiance_parameters", "radiance_parameters")
            .input_from("octree", "prepare", "resources")
            .output_as("results", SlotKind::Folder, "initial_results")
            .build();

        assert_eq!(task.inputs.len(), 2);
        assert!(task.input("octree").is_some());
        assert_eq!(
            task.output("results").unwrap().published_path(),
            "initial_results"
        );
        assert_eq!(task.upstream_tasks().collect::<Vec<_>>(), vec!["prepare"]);
    }

    #[test]
    fn test_builder_rejects_malformed_sub_path() {
        let result = TaskDescriptor::builder("post", ExecutorRef::new("postprocess"))
            .input_from_path("grids_info", "prepare", "resources", "{{grids_info");
        assert!(result.is_err());
    }

    #[test]
    fn test_templated_literal_input() {
        let task = TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
            .input_template("sensor_count", "{{item.count}}")
            .unwrap()
            .build();
        assert!(matches!(
            task.input("sensor_count").unwrap().source,
            InputSource::Template(_)
        ));
    }
}
