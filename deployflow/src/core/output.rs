//! Action output type with factory methods.

use super::{ActionStatus, Artifact};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a single action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// The terminal status of the action.
    pub status: ActionStatus,

    /// Variables exported into the action's namespace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// The artifact produced by the action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    /// Error or rejection message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutput {
    /// Creates a successful output with no exports.
    #[must_use]
    pub fn succeeded() -> Self {
        Self {
            status: ActionStatus::Succeeded,
            variables: BTreeMap::new(),
            artifact: None,
            error: None,
        }
    }

    /// Creates a failure output.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            variables: BTreeMap::new(),
            artifact: None,
            error: Some(error.into()),
        }
    }

    /// Creates a rejected output (approval denied or timed out).
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Rejected,
            variables: BTreeMap::new(),
            artifact: None,
            error: Some(reason.into()),
        }
    }

    /// Creates a skipped output.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            status: ActionStatus::Skipped,
            variables: BTreeMap::new(),
            artifact: None,
            error: None,
        }
    }

    /// Adds an exported variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Replaces the exported variables.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Attaches the produced artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Returns true if the action succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_with_variables() {
        let output = ActionOutput::succeeded()
            .with_variable("ARTIFACTS_PATH", "s3://app/build-1.zip")
            .with_variable("GIT_BRANCH", "master");

        assert!(output.is_success());
        assert_eq!(output.variables.len(), 2);
        assert_eq!(
            output.variables.get("ARTIFACTS_PATH").map(String::as_str),
            Some("s3://app/build-1.zip")
        );
    }

    #[test]
    fn test_failed_and_rejected() {
        let failed = ActionOutput::failed("exit code 2");
        assert_eq!(failed.status, ActionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("exit code 2"));

        let rejected = ActionOutput::rejected("denied by reviewer");
        assert_eq!(rejected.status, ActionStatus::Rejected);
        assert!(!rejected.is_success());
    }

    #[test]
    fn test_output_serialization_skips_empty() {
        let json = serde_json::to_value(ActionOutput::succeeded()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "succeeded"}));
    }
}
