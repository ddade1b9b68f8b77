//! Core domain model types for deployflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Action kind, status and environment enums
//! - Action output type with factory methods
//! - Content-addressed artifact handles

mod artifact;
mod output;
mod status;

pub use artifact::{content_digest, Artifact};
pub use output::ActionOutput;
pub use status::{ActionKind, ActionStatus, Environment};
