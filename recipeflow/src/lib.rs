//! # Recipeflow
//!
//! A declarative task-graph engine for multi-stage batch computations.
//!
//! Recipeflow pipelines are built in three phases:
//!
//! - **Declare**: register typed, constrained input parameters in a
//!   [`params::ParameterSet`] and bind concrete values to them
//! - **Wire**: add task descriptors to a [`graph::GraphBuilder`], where
//!   every input references a parameter or an already-added task's
//!   output, so the graph is acyclic by construction
//! - **Run**: hand the built [`graph::DependencyGraph`] to an
//!   [`engine::RunEngine`], which expands fan-out bindings over
//!   runtime collections, dispatches instances to an external
//!   [`executor::TaskExecutor`], and merges per-item outputs before
//!   any consumer proceeds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recipeflow::prelude::*;
//!
//! let mut params = ParameterSet::new();
//! params.declare(ParameterDecl::file("wea").with_extensions(["wea"]))?;
//! params.bind("wea", ParameterValue::File("weather.wea".into()))?;
//!
//! let mut builder = GraphBuilder::new("annual-irradiance", params);
//! builder.add_task(
//!     TaskDescriptor::builder("prepare", ExecutorRef::new("prepare-folder"))
//!         .input_param("wea", "wea")
//!         .output("sensor_grids", SlotKind::Collection)
//!         .build(),
//! )?;
//! let graph = builder.build()?;
//!
//! let engine = RunEngine::new(executor);
//! let result = engine.run(&graph).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod cancellation;
pub mod core;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod fanout;
pub mod graph;
pub mod manifest;
pub mod params;
pub mod template;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{InstanceOutcome, MergedArtifact, OutputAggregator};
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{Artifact, CollectionItem, InstanceStatus, OutputValue};
    pub use crate::engine::{
        InstanceResult, ResolvedPipelineOutput, RunEngine, RunFailure, RunResult, TaskRunResult,
    };
    pub use crate::errors::{
        AggregationError, CycleDetectedError, GraphError, InstanceExecutionError, ParameterError,
        RecipeflowError, TemplateError,
    };
    pub use crate::executor::{
        ExecutorRef, FnExecutor, NoOpExecutor, RecordingExecutor, TaskExecutor, TaskOutputs,
    };
    pub use crate::fanout::{
        FanOutBinding, FanOutResolution, FanOutResolver, ResolvedInput, ResolvedValue,
        TaskInstance,
    };
    pub use crate::graph::{
        DependencyGraph, GraphBuilder, InputBinding, InputSource, OutputSlot, OutputSource,
        PipelineOutput, SlotKind, TaskDescriptor, TaskDescriptorBuilder,
    };
    pub use crate::manifest::PipelineManifest;
    pub use crate::params::{
        Constraint, ParameterDecl, ParameterKind, ParameterSet, ParameterValue,
    };
    pub use crate::template::PathTemplate;
}
