//! Error types for the deployflow pipeline and canary validator.
//!
//! Pipeline construction errors carry a [`ContractErrorInfo`] with a stable
//! code so callers can react to specific misconfigurations. Canary errors
//! follow the validator's failure taxonomy: configuration, invocation,
//! consistency and report delivery.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployflowError {
    /// Pipeline construction failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// An exported variable was written twice in one execution.
    #[error("{0}")]
    VariableConflict(#[from] VariableConflictError),

    /// An artifact was produced twice in one execution.
    #[error("{0}")]
    ArtifactConflict(#[from] ArtifactConflictError),

    /// The canary validator terminated abnormally.
    #[error("{0}")]
    Canary(#[from] CanaryError),

    /// Object storage failure.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// An external procedure could not be run.
    #[error("{0}")]
    Procedure(#[from] ProcedureError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-FORWARD_REF").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages or actions involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when an exported variable is published twice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Variable conflict: '{namespace}.{name}' was already exported in this execution")]
pub struct VariableConflictError {
    /// The namespace of the variable.
    pub namespace: String,
    /// The variable name.
    pub name: String,
}

impl VariableConflictError {
    /// Creates a new variable conflict error.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Error raised when an artifact is produced twice.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Artifact conflict: '{artifact}' was already produced in this execution")]
pub struct ArtifactConflictError {
    /// The artifact name.
    pub artifact: String,
}

impl ArtifactConflictError {
    /// Creates a new artifact conflict error.
    #[must_use]
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
        }
    }
}

/// Object storage failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Storage error on '{key}': {reason}")]
pub struct StorageError {
    /// The object key involved.
    pub key: String,
    /// Why the operation failed.
    pub reason: String,
}

impl StorageError {
    /// Creates a new storage error.
    #[must_use]
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to launch or talk to an external build/test/deploy procedure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Procedure '{procedure}' failed to run: {reason}")]
pub struct ProcedureError {
    /// The procedure name.
    pub procedure: String,
    /// Why it could not run.
    pub reason: String,
}

impl ProcedureError {
    /// Creates a new procedure error.
    #[must_use]
    pub fn new(procedure: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of a canary validation run.
///
/// All variants except [`CanaryError::ReportDelivery`] end in a `Failed`
/// verdict being reported. A delivery failure is fatal to the hook itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CanaryError {
    /// Required lifecycle context fields are missing.
    #[error("Missing lifecycle hook field: {field}")]
    Configuration {
        /// The missing field.
        field: String,
    },

    /// The candidate version could not be exercised.
    #[error("Candidate '{function}' could not be invoked: {reason}")]
    Invocation {
        /// The candidate function identifier.
        function: String,
        /// Why the dispatch failed.
        reason: String,
    },

    /// The probe write was not observable after the settling interval.
    #[error("Probe '{key}' not observable: {reason}")]
    Consistency {
        /// The probe key.
        key: String,
        /// What went wrong.
        reason: String,
    },

    /// The verdict callback to the deployment orchestrator failed.
    #[error("Verdict for deployment '{deployment_id}' could not be delivered: {reason}")]
    ReportDelivery {
        /// The deployment the verdict belonged to.
        deployment_id: String,
        /// Why delivery failed.
        reason: String,
    },
}

impl CanaryError {
    /// Returns the taxonomy name of this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::Invocation { .. } => "InvocationError",
            Self::Consistency { .. } => "ConsistencyError",
            Self::ReportDelivery { .. } => "ReportDeliveryError",
        }
    }

    /// Returns true if the error ends the hook abnormally rather than in a report.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReportDelivery { .. })
    }
}

/// Provides default suggestions for pipeline contract error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-FORWARD_REF" => Some(
                "Variables can only be read from actions that run earlier. \
                 Move the exporting action to an earlier stage or a lower run order.",
            ),
            "PIPELINE-UNKNOWN_NAMESPACE" => Some(
                "Set a variables namespace on the exporting action and check the spelling.",
            ),
            "PIPELINE-DEPLOY_BINDINGS" => Some(
                "Deploy actions need ENVIRONMENT and ARTIFACTS_PATH bound from a Build namespace.",
            ),
            "PIPELINE-APPROVAL_ORDER" => Some(
                "Place a manual approval with a lower run order in the production stage.",
            ),
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline before building."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("PIPELINE-FORWARD_REF", "Forward reference")
            .with_fix_hint("Reorder actions")
            .with_context_entry("action", "Deploy");

        assert_eq!(info.code, "PIPELINE-FORWARD_REF");
        assert_eq!(info.fix_hint.as_deref(), Some("Reorder actions"));
        assert_eq!(info.context.get("action"), Some(&"Deploy".to_string()));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad")
            .with_stages(vec!["Build".to_string()])
            .with_error_info(ContractErrorInfo::new("PIPELINE-EMPTY", "empty"));

        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
        assert_eq!(err.stages, vec!["Build".to_string()]);
        assert_eq!(PipelineValidationError::new("x").code(), None);
    }

    #[test]
    fn test_canary_error_kinds() {
        let err = CanaryError::Configuration {
            field: "DeploymentId".to_string(),
        };
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("DeploymentId"));

        let err = CanaryError::ReportDelivery {
            deployment_id: "d-1".to_string(),
            reason: "throttled".to_string(),
        };
        assert_eq!(err.kind(), "ReportDeliveryError");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_error_conversion() {
        let err: DeployflowError = StorageError::new("user_1.json", "denied").into();
        assert!(matches!(err, DeployflowError::Storage(_)));
        assert!(err.to_string().contains("user_1.json"));
    }

    #[test]
    fn test_contract_suggestions() {
        assert!(ContractSuggestions::get("PIPELINE-FORWARD_REF").is_some());
        assert!(ContractSuggestions::get("UNKNOWN").is_none());
    }
}
