//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications with progress weights
//! - A validating pipeline builder
//! - The sequential orchestrator
//! - The persistence collaborator seam

mod builder;
mod integration_tests;
mod orchestrator;
mod progress;
mod spec;
mod store;

pub use builder::PipelineBuilder;
pub use orchestrator::{Assembler, Pipeline};
pub use progress::ProgressTracker;
pub use spec::StageSpec;
pub use store::{InMemoryResultStore, ResultStore};

#[cfg(test)]
pub use store::MockResultStore;
