//! The pre-traffic validation state machine.

use super::guard::{ProbeGuard, ProbeLeases};
use super::ports::{CandidateInvoker, DeploymentOrchestrator, ValidationVerdict, VerdictReport};
use super::{HookInvocation, LifecycleHookContext, SyntheticEvent};
use crate::config::ValidatorConfig;
use crate::errors::{CanaryError, StorageError};
use crate::events::{EventSink, NoOpEventSink};
use crate::storage::ObjectStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// States of one validation run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "verdict")]
pub enum ValidatorState {
    /// Extracting the lifecycle context.
    Received,
    /// Dispatching the synthetic event to the candidate.
    Invoking,
    /// Writing the probe record and waiting for it to settle.
    Probing,
    /// Reading the probe record back.
    Verifying,
    /// Deleting the probe record.
    Cleanup,
    /// Reporting the verdict.
    Report(ValidationVerdict),
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Invoking => write!(f, "invoking"),
            Self::Probing => write!(f, "probing"),
            Self::Verifying => write!(f, "verifying"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Report(verdict) => write!(f, "report({verdict})"),
        }
    }
}

/// What a completed validation run did.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// The report delivered to the orchestrator.
    pub report: VerdictReport,
    /// Why the verdict is `Failed`, if it is.
    pub cause: Option<CanaryError>,
    /// The probe key, once derived.
    pub probe_key: Option<String>,
    /// Cleanup failure; never affects the verdict.
    pub cleanup_error: Option<StorageError>,
    /// Every state entered, in order.
    pub states: Vec<ValidatorState>,
}

impl ValidationOutcome {
    /// Returns the reported verdict.
    #[must_use]
    pub fn verdict(&self) -> ValidationVerdict {
        self.report.status
    }
}

/// Validates a freshly deployed candidate before traffic shifts to it.
///
/// Each run dispatches a synthetic confirmed-user event to the candidate,
/// writes and reads back a probe record keyed by the run's subject, deletes
/// the record and reports exactly one verdict to the orchestrator.
pub struct CanaryValidator {
    config: ValidatorConfig,
    invoker: Arc<dyn CandidateInvoker>,
    probe_store: Arc<dyn ObjectStore>,
    orchestrator: Arc<dyn DeploymentOrchestrator>,
    leases: Arc<ProbeLeases>,
    event_sink: Arc<dyn EventSink>,
}

impl CanaryValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        config: ValidatorConfig,
        invoker: Arc<dyn CandidateInvoker>,
        probe_store: Arc<dyn ObjectStore>,
        orchestrator: Arc<dyn DeploymentOrchestrator>,
    ) -> Self {
        Self {
            config,
            invoker,
            probe_store,
            orchestrator,
            leases: Arc::new(ProbeLeases::new()),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Shares a lease table with other validators using the same store.
    #[must_use]
    pub fn with_leases(mut self, leases: Arc<ProbeLeases>) -> Self {
        self.leases = leases;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Runs one validation.
    ///
    /// Every run reports exactly one verdict. Failures of the candidate, the
    /// probe write or the read-back end in a `Failed` report and an `Ok`
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns `CanaryError::ReportDelivery` if the verdict could not be
    /// delivered; the orchestrator has no other way to learn it.
    pub async fn run(&self, invocation: &HookInvocation) -> Result<ValidationOutcome, CanaryError> {
        let mut run = RunLog::new(self.event_sink.clone());
        run.enter(ValidatorState::Received);
        info!(
            deployment_id = ?invocation.deployment_id,
            execution_id = ?invocation.lifecycle_event_hook_execution_id,
            "Pre-traffic validation received"
        );

        let context = match invocation.context() {
            Ok(context) => context,
            Err(cause) => {
                warn!(error = %cause, "Lifecycle context incomplete; failing closed");
                let report = VerdictReport {
                    deployment_id: invocation.deployment_id.clone().unwrap_or_default(),
                    lifecycle_event_hook_execution_id: invocation
                        .lifecycle_event_hook_execution_id
                        .clone()
                        .unwrap_or_default(),
                    status: ValidationVerdict::Failed,
                };
                return self.report(run, report, Some(cause), None, None).await;
            }
        };

        let event = SyntheticEvent::for_execution(
            &self.config.subject_id,
            &context.lifecycle_event_hook_execution_id,
        );
        let key = event.probe_key();
        let lease = self.leases.acquire(&key).await;

        let (cause, cleanup_error) = self.exercise(&mut run, &event, &key).await;
        drop(lease);

        let status = if cause.is_none() {
            ValidationVerdict::Succeeded
        } else {
            ValidationVerdict::Failed
        };
        let report = report_for(&context, status);
        self.report(run, report, cause, Some(key), cleanup_error).await
    }

    /// Invoking through Cleanup. Returns the failure cause, if any, and the
    /// cleanup error, if any.
    async fn exercise(
        &self,
        run: &mut RunLog,
        event: &SyntheticEvent,
        key: &str,
    ) -> (Option<CanaryError>, Option<StorageError>) {
        // Armed before anything can write the key.
        let mut guard = ProbeGuard::arm(self.probe_store.clone(), key);

        run.enter(ValidatorState::Invoking);
        let mut cause = match self.invoker.invoke(&self.config.candidate_function, event).await {
            Ok(()) => {
                debug!(function = %self.config.candidate_function, "Candidate dispatched");
                None
            }
            Err(e) => {
                warn!(function = %self.config.candidate_function, error = %e, "Candidate dispatch failed");
                Some(CanaryError::Invocation {
                    function: self.config.candidate_function.clone(),
                    reason: e.to_string(),
                })
            }
        };

        if cause.is_none() {
            cause = self.probe(run, event, key).await;
        }

        run.enter(ValidatorState::Cleanup);
        let cleanup_error = match self.probe_store.delete(key).await {
            Ok(()) => {
                debug!(key = %key, "Probe record deleted");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Probe cleanup failed");
                Some(e)
            }
        };
        guard.disarm();

        (cause, cleanup_error)
    }

    /// Probing and Verifying.
    async fn probe(&self, run: &mut RunLog, event: &SyntheticEvent, key: &str) -> Option<CanaryError> {
        let consistency = |reason: String| CanaryError::Consistency {
            key: key.to_string(),
            reason,
        };

        run.enter(ValidatorState::Probing);
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => return Some(consistency(e.to_string())),
        };
        if let Err(e) = self.probe_store.put(key, body).await {
            warn!(key = %key, error = %e, "Probe write failed");
            return Some(consistency(e.to_string()));
        }

        let settling = self.config.settling_interval();
        debug!(key = %key, settling_ms = self.config.settling_interval_ms, "Waiting for probe to settle");
        tokio::time::sleep(settling).await;

        run.enter(ValidatorState::Verifying);
        match self.probe_store.get(key).await {
            Ok(Some(_)) => None,
            Ok(None) => {
                warn!(key = %key, "Probe record absent after settling interval");
                Some(consistency("record absent after settling interval".to_string()))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Probe read failed");
                Some(consistency(e.to_string()))
            }
        }
    }

    async fn report(
        &self,
        mut run: RunLog,
        report: VerdictReport,
        cause: Option<CanaryError>,
        probe_key: Option<String>,
        cleanup_error: Option<StorageError>,
    ) -> Result<ValidationOutcome, CanaryError> {
        run.enter(ValidatorState::Report(report.status));

        if let Err(e) = self.orchestrator.report(&report).await {
            error!(
                deployment_id = %report.deployment_id,
                status = %report.status,
                error = %e,
                "Verdict delivery failed"
            );
            return Err(CanaryError::ReportDelivery {
                deployment_id: report.deployment_id,
                reason: e.to_string(),
            });
        }

        info!(
            deployment_id = %report.deployment_id,
            execution_id = %report.lifecycle_event_hook_execution_id,
            status = %report.status,
            cause = ?cause.as_ref().map(CanaryError::kind),
            "Verdict reported"
        );
        self.event_sink.try_emit(
            "canary.verdict",
            Some(serde_json::json!({
                "deployment_id": &report.deployment_id,
                "lifecycle_event_hook_execution_id": &report.lifecycle_event_hook_execution_id,
                "status": report.status,
                "cause": cause.as_ref().map(CanaryError::kind),
                "cleanup_failed": cleanup_error.is_some(),
            })),
        );

        Ok(ValidationOutcome {
            report,
            cause,
            probe_key,
            cleanup_error,
            states: run.states,
        })
    }
}

impl fmt::Debug for CanaryValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanaryValidator")
            .field("config", &self.config)
            .field("probe_store", &self.probe_store.name())
            .finish_non_exhaustive()
    }
}

fn report_for(context: &LifecycleHookContext, status: ValidationVerdict) -> VerdictReport {
    VerdictReport {
        deployment_id: context.deployment_id.clone(),
        lifecycle_event_hook_execution_id: context.lifecycle_event_hook_execution_id.clone(),
        status,
    }
}

/// Records state transitions of one run.
struct RunLog {
    states: Vec<ValidatorState>,
    sink: Arc<dyn EventSink>,
}

impl RunLog {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            states: Vec::with_capacity(6),
            sink,
        }
    }

    fn enter(&mut self, state: ValidatorState) {
        debug!(state = %state, "Validator state");
        self.sink
            .try_emit("canary.state", Some(serde_json::json!({"state": state.to_string()})));
        self.states.push(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canary::ports::{MockCandidateInvoker, MockDeploymentOrchestrator};
    use crate::storage::InMemoryObjectStore;
    use std::time::Duration;

    fn config() -> ValidatorConfig {
        ValidatorConfig::new("probes", "new-user:candidate")
            .with_settling_interval(Duration::from_millis(1500))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ValidatorState::Probing.to_string(), "probing");
        assert_eq!(
            ValidatorState::Report(ValidationVerdict::Failed).to_string(),
            "report(Failed)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_states() {
        let mut invoker = MockCandidateInvoker::new();
        invoker.expect_invoke().times(1).returning(|_, _| Ok(()));
        let mut orchestrator = MockDeploymentOrchestrator::new();
        orchestrator
            .expect_report()
            .times(1)
            .withf(|r: &VerdictReport| r.status == ValidationVerdict::Succeeded)
            .returning(|_| Ok(()));

        let validator = CanaryValidator::new(
            config(),
            Arc::new(invoker),
            Arc::new(InMemoryObjectStore::new("probes")),
            Arc::new(orchestrator),
        );
        let outcome = validator
            .run(&HookInvocation::new("d-1", "exec-1"))
            .await
            .unwrap();

        assert_eq!(
            outcome.states,
            vec![
                ValidatorState::Received,
                ValidatorState::Invoking,
                ValidatorState::Probing,
                ValidatorState::Verifying,
                ValidatorState::Cleanup,
                ValidatorState::Report(ValidationVerdict::Succeeded),
            ]
        );
        assert!(outcome.cause.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invocation_failure_skips_probe() {
        let mut invoker = MockCandidateInvoker::new();
        invoker
            .expect_invoke()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("function not found")));
        let mut orchestrator = MockDeploymentOrchestrator::new();
        orchestrator
            .expect_report()
            .times(1)
            .withf(|r: &VerdictReport| r.status == ValidationVerdict::Failed)
            .returning(|_| Ok(()));
        let store = Arc::new(InMemoryObjectStore::new("probes"));

        let validator = CanaryValidator::new(config(), Arc::new(invoker), store.clone(), Arc::new(orchestrator));
        let outcome = validator
            .run(&HookInvocation::new("d-1", "exec-1"))
            .await
            .unwrap();

        assert_eq!(outcome.cause.as_ref().map(CanaryError::kind), Some("InvocationError"));
        assert!(!outcome.states.contains(&ValidatorState::Probing));
        assert!(outcome.states.contains(&ValidatorState::Cleanup));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_failure_is_fatal() {
        let mut invoker = MockCandidateInvoker::new();
        invoker.expect_invoke().returning(|_, _| Ok(()));
        let mut orchestrator = MockDeploymentOrchestrator::new();
        orchestrator
            .expect_report()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("throttled")));
        let store = Arc::new(InMemoryObjectStore::new("probes"));

        let validator = CanaryValidator::new(config(), Arc::new(invoker), store.clone(), Arc::new(orchestrator));
        let err = validator
            .run(&HookInvocation::new("d-9", "exec-1"))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(
            err,
            CanaryError::ReportDelivery {
                deployment_id: "d-9".to_string(),
                reason: "throttled".to_string(),
            }
        );
        // Cleanup still ran before the report.
        assert!(store.is_empty());
    }
}
