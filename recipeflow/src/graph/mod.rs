//! Task descriptors and the dependency graph.
//!
//! Tasks declare named inputs bound to parameters or upstream outputs,
//! and named output slots republished under external paths. Because an
//! input may only reference a task already present in the graph, the
//! graph is acyclic by construction and insertion order is a valid
//! topological order.

mod builder;
mod descriptor;
mod outputs;

pub use builder::GraphBuilder;
pub use descriptor::{
    InputBinding, InputSource, OutputSlot, SlotKind, TaskDescriptor, TaskDescriptorBuilder,
};
pub use outputs::{OutputSource, PipelineOutput};

use crate::errors::{CycleDetectedError, GraphError};
use crate::params::ParameterSet;
use std::collections::{HashMap, HashSet};

/// A validated, immutable dependency graph of task descriptors.
///
/// Built through [`GraphBuilder`]; exclusively owns its descriptors.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    name: String,
    params: ParameterSet,
    tasks: Vec<TaskDescriptor>,
    index: HashMap<String, usize>,
    outputs: Vec<PipelineOutput>,
}

impl DependencyGraph {
    pub(crate) fn new(
        name: String,
        params: ParameterSet,
        tasks: Vec<TaskDescriptor>,
        outputs: Vec<PipelineOutput>,
    ) -> Self {
        let index = tasks
            .iter()
            .enumerate()
            .map(|(position, task)| (task.id.clone(), position))
            .collect();
        Self {
            name,
            params,
            tasks,
            index,
            outputs,
        }
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sealed parameter set the graph was built against.
    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Looks up a task descriptor by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TaskDescriptor> {
        self.index.get(id).map(|position| &self.tasks[*position])
    }

    /// All task descriptors in insertion order.
    #[must_use]
    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    /// The number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// The declared pipeline-level outputs.
    #[must_use]
    pub fn outputs(&self) -> &[PipelineOutput] {
        &self.outputs
    }

    /// The ids of tasks the given task consumes outputs from.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        let Some(task) = self.task(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut deps = Vec::new();
        for upstream in task.upstream_tasks() {
            if seen.insert(upstream) {
                deps.push(upstream);
            }
        }
        deps
    }

    /// The ids of tasks that consume the given task's outputs.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|task| task.upstream_tasks().any(|upstream| upstream == id))
            .map(|task| task.id.as_str())
            .collect()
    }

    /// Returns the execution order of task ids.
    ///
    /// Insertion order is already topological (inputs may only reference
    /// already-added tasks), so it is returned directly after
    /// re-validating acyclicity and edge consistency.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if a cycle is present. Unreachable
    /// through [`GraphBuilder`] today; the check guards future
    /// extensions that could allow same-pass references.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        self.validate_acyclic()?;

        // Every producer must precede its consumer in insertion order.
        for (position, task) in self.tasks.iter().enumerate() {
            for upstream in task.upstream_tasks() {
                let producer = self.index.get(upstream).copied();
                if producer.is_none() || producer >= Some(position) {
                    return Err(GraphError::CycleDetected(CycleDetectedError::new(vec![
                        upstream.to_string(),
                        task.id.clone(),
                    ])));
                }
            }
        }

        Ok(self.tasks.iter().map(|task| task.id.clone()).collect())
    }

    fn validate_acyclic(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        let mut path = Vec::new();

        for task in &self.tasks {
            if !visited.contains(task.id.as_str()) {
                if let Some(cycle) =
                    self.dfs_cycle(&task.id, &mut visited, &mut in_stack, &mut path)
                {
                    return Err(GraphError::CycleDetected(CycleDetectedError::new(cycle)));
                }
            }
        }
        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        in_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        in_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(task) = self.task(node) {
            for upstream in task.upstream_tasks() {
                if !visited.contains(upstream) {
                    if let Some(cycle) = self.dfs_cycle(upstream, visited, in_stack, path) {
                        return Some(cycle);
                    }
                } else if in_stack.contains(upstream) {
                    let start = path.iter().position(|id| id == upstream).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(upstream.to_string());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        in_stack.remove(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorRef;
    use crate::params::{ParameterDecl, ParameterValue};

    fn params() -> ParameterSet {
        let mut params = ParameterSet::new();
        params
            .declare(
                ParameterDecl::file("wea")
                    .with_extensions(["wea"])
                    .with_default(ParameterValue::File("weather.wea".to_string())),
            )
            .unwrap();
        params
    }

    fn chain_graph() -> DependencyGraph {
        let mut builder = GraphBuilder::new("chain", params());
        builder
            .add_task(
                TaskDescriptor::builder("prepare", ExecutorRef::new("prepare-folder"))
                    .input_param("wea", "wea")
                    .output("resources", SlotKind::Folder)
                    .build(),
            )
            .unwrap();
        builder
            .add_task(
                TaskDescriptor::builder("trace", ExecutorRef::new("ray-tracing"))
                    .input_from("resources", "prepare", "resources")
                    .output("results", SlotKind::Folder)
                    .build(),
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_and_counts() {
        let graph = chain_graph();
        assert_eq!(graph.name(), "chain");
        assert_eq!(graph.task_count(), 2);
        assert!(graph.task("prepare").is_some());
        assert!(graph.task("missing").is_none());
    }

    #[test]
    fn test_dependency_edges() {
        let graph = chain_graph();
        assert_eq!(graph.dependencies_of("trace"), vec!["prepare"]);
        assert_eq!(graph.dependents_of("prepare"), vec!["trace"]);
        assert!(graph.dependencies_of("prepare").is_empty());
    }

    #[test]
    fn test_topological_order_is_insertion_order() {
        let graph = chain_graph();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["prepare".to_string(), "trace".to_string()]);
    }

    #[test]
    fn test_random_dags_keep_producers_before_consumers() {
        use rand::prelude::*;

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let task_count = rng.gen_range(2..=12);
            let mut builder = GraphBuilder::new("random", params());
            for position in 0..task_count {
                let id = format!("task_{position}");
                let mut task =
                    TaskDescriptor::builder(&id, ExecutorRef::new("noop")).output("out", SlotKind::Folder);
                // Wire against a random subset of earlier tasks.
                for upstream in 0..position {
                    if rng.gen_bool(0.4) {
                        task = task.input_from(
                            format!("in_{upstream}"),
                            format!("task_{upstream}"),
                            "out",
                        );
                    }
                }
                builder.add_task(task.build()).unwrap();
            }
            let graph = builder.build().unwrap();

            let order = graph.topological_order().unwrap();
            for (position, id) in order.iter().enumerate() {
                for upstream in graph.dependencies_of(id) {
                    let producer = order.iter().position(|o| o == upstream).unwrap();
                    assert!(producer < position, "{upstream} must precede {id}");
                }
            }
        }
    }
}
