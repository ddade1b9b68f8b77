//! Context management for pipeline execution.
//!
//! This module provides:
//! - Execution identity and source triggers
//! - Write-once bags for exported variables and artifacts
//! - Pipeline-level and action-level execution contexts

mod bags;
mod execution;
mod identity;

pub use bags::{ArtifactBag, VariableBag};
pub use execution::{ActionContext, ExecutionContext};
pub use identity::{ExecutionId, SourceTrigger, TriggerReason};
