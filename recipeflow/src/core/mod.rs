//! Core value types shared across the engine.
//!
//! All cross-task communication goes through these immutable named
//! artifacts; tasks never share mutable state.

mod artifact;
mod collection;
mod status;

pub use artifact::{Artifact, ArtifactKind, OutputValue};
pub use collection::CollectionItem;
pub use status::InstanceStatus;
