//! Manual approval gate.

use super::Action;
use crate::context::ActionContext;
use crate::core::ActionOutput;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{info, warn};
use uuid::Uuid;

/// How an approval request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// A reviewer approved.
    Approved,
    /// A reviewer rejected.
    Rejected {
        /// The reviewer's reason.
        reason: String,
    },
    /// Nobody decided before the timeout.
    TimedOut,
    /// The request was withdrawn.
    Cancelled,
}

impl ApprovalDecision {
    /// Returns true if the gate opens.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// A request waiting for a reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    /// Request ID.
    pub id: Uuid,
    /// The approval action's name.
    pub action: String,
    /// The stage the action belongs to.
    pub stage: String,
    /// Information shown to the reviewer.
    pub additional_information: String,
}

struct ApprovalRequest {
    pending: PendingApproval,
    response_tx: oneshot::Sender<ApprovalDecision>,
}

/// Tracks approval requests and routes reviewer decisions to them.
#[derive(Default)]
pub struct ApprovalService {
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
    arrivals: Notify,
}

impl ApprovalService {
    /// Creates a new approval service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a request and waits for a decision or the timeout.
    pub async fn request_approval(
        &self,
        stage: &str,
        action: &str,
        additional_information: &str,
        timeout: Duration,
    ) -> ApprovalDecision {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        self.requests.write().insert(
            id,
            ApprovalRequest {
                pending: PendingApproval {
                    id,
                    action: action.to_string(),
                    stage: stage.to_string(),
                    additional_information: additional_information.to_string(),
                },
                response_tx: tx,
            },
        );
        self.arrivals.notify_waiters();
        info!(request_id = %id, stage = %stage, action = %action, "Approval requested");

        let decision = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::Cancelled,
            Err(_) => ApprovalDecision::TimedOut,
        };
        self.requests.write().remove(&id);
        decision
    }

    /// Approves a pending request. Returns false if it is unknown.
    pub fn approve(&self, request_id: Uuid) -> bool {
        self.decide(request_id, ApprovalDecision::Approved)
    }

    /// Rejects a pending request. Returns false if it is unknown.
    pub fn reject(&self, request_id: Uuid, reason: impl Into<String>) -> bool {
        self.decide(
            request_id,
            ApprovalDecision::Rejected {
                reason: reason.into(),
            },
        )
    }

    /// Withdraws a pending request.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        self.requests.write().remove(&request_id).is_some()
    }

    fn decide(&self, request_id: Uuid, decision: ApprovalDecision) -> bool {
        match self.requests.write().remove(&request_id) {
            Some(request) => request.response_tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Returns the pending requests.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<PendingApproval> {
        self.requests
            .read()
            .values()
            .map(|r| r.pending.clone())
            .collect()
    }

    /// Returns the number of pending requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.read().len()
    }

    /// Waits until a request is pending and returns it.
    pub async fn next_pending(&self) -> PendingApproval {
        loop {
            let notified = self.arrivals.notified();
            if let Some(pending) = self.pending_requests().into_iter().next() {
                return pending;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for ApprovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalService")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// A ManualApproval action: succeeds only when a reviewer approves.
#[derive(Debug)]
pub struct ApprovalAction {
    name: String,
    additional_information: String,
    timeout: Duration,
    service: Arc<ApprovalService>,
}

impl ApprovalAction {
    /// Creates an approval action.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        additional_information: impl Into<String>,
        timeout: Duration,
        service: Arc<ApprovalService>,
    ) -> Self {
        Self {
            name: name.into(),
            additional_information: additional_information.into(),
            timeout,
            service,
        }
    }
}

#[async_trait]
impl Action for ApprovalAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        ctx.try_emit_event(
            "approval.requested",
            Some(serde_json::json!({"information": &self.additional_information})),
        );

        let decision = self
            .service
            .request_approval(ctx.stage(), &self.name, &self.additional_information, self.timeout)
            .await;

        match decision {
            ApprovalDecision::Approved => {
                info!(stage = %ctx.stage(), action = %self.name, "Approval granted");
                ActionOutput::succeeded()
            }
            ApprovalDecision::Rejected { reason } => {
                warn!(stage = %ctx.stage(), reason = %reason, "Approval rejected");
                ActionOutput::rejected(format!("rejected: {reason}"))
            }
            ApprovalDecision::TimedOut => {
                warn!(stage = %ctx.stage(), timeout_secs = self.timeout.as_secs(), "Approval timed out");
                ActionOutput::rejected("approval timed out")
            }
            ApprovalDecision::Cancelled => ActionOutput::rejected("approval cancelled"),
        }
    }
}
