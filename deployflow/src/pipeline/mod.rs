//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage and action specifications with variable and artifact wiring
//! - A builder that rejects invalid pipelines at construction
//! - The sequential stage graph executor
//! - The standard Source/Build/Test/Staging/Production delivery pipeline

mod builder;
pub mod delivery;
mod graph;
mod spec;


pub use builder::{PipelineBuilder, ENVIRONMENT, STACK_NAME};
pub use delivery::{standard_pipeline, DeliveryCollaborators};
pub use graph::{ActionResult, PipelineExecution, StageGraph, StageResult};
pub use spec::{ActionSpec, Binding, StageSpec, DEFAULT_RUN_ORDER};
