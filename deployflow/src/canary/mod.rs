//! Pre-traffic canary validation.
//!
//! The deployment orchestrator invokes the validator once per lifecycle hook
//! execution, before any traffic is shifted to a new version. A run moves
//! through [`ValidatorState`]s strictly in order:
//!
//! 1. `Received`: extract the [`LifecycleHookContext`]; fail closed if incomplete
//! 2. `Invoking`: dispatch a [`SyntheticEvent`] to the candidate
//! 3. `Probing`: write the probe record, wait for the settling interval
//! 4. `Verifying`: read the record back
//! 5. `Cleanup`: delete the record, whatever the verdict
//! 6. `Report`: deliver exactly one [`ValidationVerdict`]
//!
//! Probe keys embed the lifecycle hook execution ID, and runs that would
//! still share a key are serialized by [`ProbeLeases`].

mod context;
mod event;
mod guard;
mod ports;
mod validator;


pub use context::{HookInvocation, LifecycleHookContext};
pub use event::{record_key, CallerContext, EventRequest, SyntheticEvent, CONFIRMED, USER_STATUS_ATTRIBUTE};
pub use guard::{ProbeGuard, ProbeLease, ProbeLeases};
pub use ports::{
    CandidateInvoker, DeploymentOrchestrator, InMemoryOrchestrator, ValidationVerdict,
    VerdictReport,
};
pub use validator::{CanaryValidator, ValidationOutcome, ValidatorState};

#[cfg(test)]
pub(crate) use ports::{MockCandidateInvoker, MockDeploymentOrchestrator};
