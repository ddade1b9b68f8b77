//! Execution identity and pipeline triggers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generates a fresh execution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a pipeline execution started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// A commit landed on the tracked branch.
    SourceEvent,
    /// Someone started the pipeline by hand.
    Manual,
}

/// The source control event that started an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrigger {
    /// The branch reference carried by the event.
    pub branch: String,
    /// Why the execution started.
    pub reason: TriggerReason,
}

impl SourceTrigger {
    /// A trigger from a commit event on `branch`.
    #[must_use]
    pub fn on_event(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            reason: TriggerReason::SourceEvent,
        }
    }

    /// An on-demand trigger for `branch`.
    #[must_use]
    pub fn manual(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            reason: TriggerReason::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_ids_are_unique() {
        assert_ne!(ExecutionId::new(), ExecutionId::new());
    }

    #[test]
    fn test_execution_id_serializes_as_uuid() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn test_trigger_constructors() {
        assert_eq!(SourceTrigger::on_event("master").reason, TriggerReason::SourceEvent);
        assert_eq!(SourceTrigger::manual("main").branch, "main");
    }
}
