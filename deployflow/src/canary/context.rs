//! Lifecycle hook invocation and correlation context.

use crate::errors::CanaryError;
use serde::{Deserialize, Serialize};

/// The payload the deployment orchestrator invokes the hook with.
///
/// Both fields are optional on the wire; [`HookInvocation::context`]
/// enforces their presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HookInvocation {
    /// The in-flight deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// The lifecycle event hook execution being validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_event_hook_execution_id: Option<String>,
}

impl HookInvocation {
    /// Creates an invocation carrying both identifiers.
    #[must_use]
    pub fn new(
        deployment_id: impl Into<String>,
        lifecycle_event_hook_execution_id: impl Into<String>,
    ) -> Self {
        Self {
            deployment_id: Some(deployment_id.into()),
            lifecycle_event_hook_execution_id: Some(lifecycle_event_hook_execution_id.into()),
        }
    }

    /// Extracts the correlation context.
    ///
    /// # Errors
    ///
    /// Returns `CanaryError::Configuration` naming the first missing or
    /// empty field.
    pub fn context(&self) -> Result<LifecycleHookContext, CanaryError> {
        let deployment_id = required("DeploymentId", self.deployment_id.as_deref())?;
        let lifecycle_event_hook_execution_id = required(
            "LifecycleEventHookExecutionId",
            self.lifecycle_event_hook_execution_id.as_deref(),
        )?;
        Ok(LifecycleHookContext {
            deployment_id,
            lifecycle_event_hook_execution_id,
        })
    }
}

fn required(field: &str, value: Option<&str>) -> Result<String, CanaryError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(CanaryError::Configuration {
            field: field.to_string(),
        }),
    }
}

/// Identifiers tying one validation run to one in-flight deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleHookContext {
    /// The in-flight deployment.
    pub deployment_id: String,
    /// The lifecycle event hook execution.
    pub lifecycle_event_hook_execution_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_orchestrator_payload() {
        let invocation: HookInvocation = serde_json::from_str(
            r#"{"DeploymentId":"d-123","LifecycleEventHookExecutionId":"exec-9"}"#,
        )
        .unwrap();

        assert_eq!(
            invocation.context().unwrap(),
            LifecycleHookContext {
                deployment_id: "d-123".to_string(),
                lifecycle_event_hook_execution_id: "exec-9".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_fields() {
        let invocation: HookInvocation =
            serde_json::from_str(r#"{"LifecycleEventHookExecutionId":"exec-9"}"#).unwrap();
        assert_eq!(
            invocation.context().unwrap_err(),
            CanaryError::Configuration {
                field: "DeploymentId".to_string()
            }
        );

        let invocation = HookInvocation {
            deployment_id: Some("d-1".to_string()),
            lifecycle_event_hook_execution_id: Some("  ".to_string()),
        };
        assert_eq!(invocation.context().unwrap_err().kind(), "ConfigurationError");
    }
}
