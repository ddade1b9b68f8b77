//! Collaborators of the canary validator and the verdict it reports.

use super::SyntheticEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The outcome of one validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationVerdict {
    /// The candidate produced its side effect; traffic may shift.
    Succeeded,
    /// The candidate could not be shown to work.
    Failed,
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The verdict callback sent to the deployment orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictReport {
    /// The deployment being validated.
    pub deployment_id: String,
    /// The lifecycle event hook execution.
    pub lifecycle_event_hook_execution_id: String,
    /// The verdict.
    pub status: ValidationVerdict,
}

/// Dispatches the synthetic event to the candidate version.
///
/// Dispatch is fire-and-forget: `Ok` means the candidate accepted the event,
/// not that it finished handling it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateInvoker: Send + Sync {
    /// Invokes `function` asynchronously with `event`.
    async fn invoke(&self, function: &str, event: &SyntheticEvent) -> anyhow::Result<()>;
}

/// Receives validation verdicts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentOrchestrator: Send + Sync {
    /// Reports the verdict of one lifecycle hook execution.
    async fn report(&self, report: &VerdictReport) -> anyhow::Result<()>;
}

/// An orchestrator that keeps reports in memory.
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    reports: Mutex<Vec<VerdictReport>>,
    unavailable: AtomicBool,
}

impl InMemoryOrchestrator {
    /// Creates an orchestrator that accepts every report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every report is refused.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the accepted reports.
    #[must_use]
    pub fn reports(&self) -> Vec<VerdictReport> {
        self.reports.lock().clone()
    }

    /// Returns the accepted reports for one deployment.
    #[must_use]
    pub fn reports_for(&self, deployment_id: &str) -> Vec<VerdictReport> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.deployment_id == deployment_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DeploymentOrchestrator for InMemoryOrchestrator {
    async fn report(&self, report: &VerdictReport) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("orchestrator unavailable");
        }
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_wire_format() {
        let report = VerdictReport {
            deployment_id: "d-1".to_string(),
            lifecycle_event_hook_execution_id: "exec-1".to_string(),
            status: ValidationVerdict::Succeeded,
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "deploymentId": "d-1",
                "lifecycleEventHookExecutionId": "exec-1",
                "status": "Succeeded",
            })
        );
    }

    #[tokio::test]
    async fn test_in_memory_orchestrator() {
        let orchestrator = InMemoryOrchestrator::new();
        let report = VerdictReport {
            deployment_id: "d-1".to_string(),
            lifecycle_event_hook_execution_id: "exec-1".to_string(),
            status: ValidationVerdict::Failed,
        };

        orchestrator.report(&report).await.unwrap();
        orchestrator.set_unavailable(true);
        assert!(orchestrator.report(&report).await.is_err());
        assert_eq!(orchestrator.reports_for("d-1"), vec![report]);
    }
}
