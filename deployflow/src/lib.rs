//! # Deployflow
//!
//! A progressive-delivery pipeline with a pre-traffic canary validation gate.
//!
//! Deployflow provides:
//!
//! - **Stage graph execution**: Source, Build, Test, Deploy-to-Staging and an
//!   approval-gated Deploy-to-Production, validated when the graph is built
//! - **Variable and artifact hand-off**: namespaced, write-once exports and
//!   content-addressed artifacts scoped to one execution
//! - **Canary validation**: a pre-traffic hook that exercises a freshly
//!   deployed version and reports exactly one verdict to the orchestrator
//! - **Event-driven observability**: structured events for every transition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let pipeline = standard_pipeline(&PipelineConfig::new("new-user"), &collaborators)?;
//! let execution = pipeline.execute(SourceTrigger::on_event("master")).await;
//!
//! let validator = CanaryValidator::new(config, invoker, probe_store, orchestrator);
//! let outcome = validator.run(&invocation).await?;
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

pub mod actions;
pub mod canary;
pub mod capture;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod storage;

#[cfg(feature = "http")]
pub mod http;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::actions::{
        Action, ApprovalService, CommandProcedure, FnAction, FnProcedure, Procedure,
        SourceRepository,
    };
    pub use crate::canary::{
        CandidateInvoker, CanaryValidator, DeploymentOrchestrator, HookInvocation,
        ValidationOutcome, ValidationVerdict, VerdictReport,
    };
    pub use crate::capture::{CaptureHandler, CaptureOutcome, LocalCandidateInvoker};
    pub use crate::config::{DeliveryConfig, PipelineConfig, ValidatorConfig};
    pub use crate::context::{ActionContext, ExecutionContext, ExecutionId, SourceTrigger};
    pub use crate::core::{ActionKind, ActionOutput, ActionStatus, Artifact, Environment};
    pub use crate::errors::{
        CanaryError, ContractErrorInfo, DeployflowError, PipelineValidationError, StorageError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        standard_pipeline, ActionSpec, Binding, DeliveryCollaborators, PipelineBuilder,
        PipelineExecution, StageGraph, StageSpec,
    };
    pub use crate::storage::{ArtifactStore, InMemoryObjectStore, ObjectStore};
}
