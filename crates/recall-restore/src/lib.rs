//! Dependency-ordered restore engine for Recall
//!
//! Replays a backup archive into the live cluster: definitions first, then
//! every other object in owner-before-dependent order. Owners get fresh
//! server-assigned uids on re-creation, so each dependent's owner-reference
//! list is rewritten from the live parents immediately before it is applied.
//!
//! The replay is single-threaded and best-effort: per-object failures are
//! collected and reported together, not fatal to the run.

#![deny(missing_docs)]

mod apply;
mod crds;
mod engine;
mod graph;
mod mapping;
mod object;

pub use apply::ApplyExecutor;
pub use crds::install_definitions;
pub use engine::{ObjectStore, RestoreEngine, RestoreReport};
pub use graph::{DependencyGraph, GraphBuilder};
pub use mapping::{KindResolver, RestMapper};
pub use object::{OwnerRef, RestoreObject};
