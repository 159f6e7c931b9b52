//! The boundary to external task executables.
//!
//! The engine never interprets what an executor does: it hands over a
//! fully-resolved [`TaskInstance`](crate::fanout::TaskInstance) and
//! expects back the instance's per-slot outputs or an opaque failure.
//! The host orchestrator resolves [`ExecutorRef`]s to real runnables.

use crate::core::OutputValue;
use crate::fanout::TaskInstance;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// An opaque reference to an external executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutorRef {
    /// The executable name, resolved by the host orchestrator.
    pub name: String,
    /// Optional version pin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ExecutorRef {
    /// Creates an unversioned reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Pins the reference to a version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl std::fmt::Display for ExecutorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The per-slot outputs one instance reports on completion.
pub type TaskOutputs = HashMap<String, OutputValue>;

/// Trait for the external execution boundary.
#[async_trait]
pub trait TaskExecutor: Send + Sync + Debug {
    /// Executes one task instance.
    ///
    /// # Errors
    ///
    /// An error marks only this instance as failed; the engine handles
    /// isolation between fan-out siblings.
    async fn execute(&self, instance: &TaskInstance) -> anyhow::Result<TaskOutputs>;
}

/// A closure-backed executor, the usual choice in tests and demos.
pub struct FnExecutor<F>
where
    F: Fn(&TaskInstance) -> anyhow::Result<TaskOutputs> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&TaskInstance) -> anyhow::Result<TaskOutputs> + Send + Sync,
{
    /// Creates a new closure-backed executor.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnExecutor<F>
where
    F: Fn(&TaskInstance) -> anyhow::Result<TaskOutputs> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> TaskExecutor for FnExecutor<F>
where
    F: Fn(&TaskInstance) -> anyhow::Result<TaskOutputs> + Send + Sync,
{
    async fn execute(&self, instance: &TaskInstance) -> anyhow::Result<TaskOutputs> {
        (self.func)(instance)
    }
}

/// An executor that reports no outputs for any instance.
#[derive(Debug, Clone, Default)]
pub struct NoOpExecutor;

#[async_trait]
impl TaskExecutor for NoOpExecutor {
    async fn execute(&self, _instance: &TaskInstance) -> anyhow::Result<TaskOutputs> {
        Ok(TaskOutputs::new())
    }
}

/// Wraps another executor and records every instance it receives.
#[derive(Debug)]
pub struct RecordingExecutor {
    inner: Arc<dyn TaskExecutor>,
    seen: Mutex<Vec<TaskInstance>>,
}

impl RecordingExecutor {
    /// Creates a recorder around the given executor.
    #[must_use]
    pub fn new(inner: Arc<dyn TaskExecutor>) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// The instances executed so far, in dispatch-completion order.
    #[must_use]
    pub fn seen(&self) -> Vec<TaskInstance> {
        self.seen.lock().clone()
    }

    /// The number of instances executed so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn execute(&self, instance: &TaskInstance) -> anyhow::Result<TaskOutputs> {
        self.seen.lock().push(instance.clone());
        self.inner.execute(instance).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_uuid;

    fn instance(task: &str) -> TaskInstance {
        TaskInstance {
            instance_id: generate_uuid(),
            task: task.to_string(),
            executor: ExecutorRef::new(task),
            item: None,
            sub_folder: None,
            inputs: Vec::new(),
        }
    }

    #[test]
    fn test_executor_ref_display() {
        assert_eq!(ExecutorRef::new("ray-tracing").to_string(), "ray-tracing");
        assert_eq!(
            ExecutorRef::new("ray-tracing")
                .with_version("0.5.2")
                .to_string(),
            "ray-tracing@0.5.2"
        );
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new("echo", |instance: &TaskInstance| {
            let mut outputs = TaskOutputs::new();
            outputs.insert(instance.task.clone(), OutputValue::Empty);
            Ok(outputs)
        });
        let outputs = executor.execute(&instance("prepare")).await.unwrap();
        assert!(outputs.contains_key("prepare"));
    }

    #[tokio::test]
    async fn test_recording_executor() {
        let recorder = RecordingExecutor::new(Arc::new(NoOpExecutor));
        recorder.execute(&instance("prepare")).await.unwrap();
        recorder.execute(&instance("trace")).await.unwrap();

        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.seen()[1].task, "trace");
    }

    #[test]
    fn test_noop_executor_reports_no_outputs() {
        let outputs = tokio_test::block_on(NoOpExecutor.execute(&instance("prepare"))).unwrap();
        assert!(outputs.is_empty());
    }
}
