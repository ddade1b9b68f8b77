//! The synthetic "confirmed user" event used to exercise a candidate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User attribute carrying the confirmation status.
pub const USER_STATUS_ATTRIBUTE: &str = "cognito:user_status";
/// Status value the capture function persists.
pub const CONFIRMED: &str = "CONFIRMED";

/// Derives the storage key for a subject: `user_<subject>.json`.
#[must_use]
pub fn record_key(subject_id: &str) -> String {
    format!("user_{subject_id}.json")
}

/// Invocation context of the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    /// SDK version string.
    pub aws_sdk_version: String,
    /// Client ID, absent for synthetic events.
    pub client_id: Option<String>,
}

/// The request part of the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// The confirmed user's attributes.
    pub user_attributes: BTreeMap<String, String>,
}

/// A post-confirmation sign-up event for a synthetic test user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticEvent {
    /// Event schema version.
    pub version: String,
    /// Region of the user pool.
    pub region: String,
    /// The user pool.
    pub user_pool_id: String,
    /// The user name.
    pub user_name: String,
    /// Caller context.
    pub caller_context: CallerContext,
    /// What fired the event.
    pub trigger_source: String,
    /// The request payload.
    pub request: EventRequest,
    /// Always empty.
    pub response: serde_json::Map<String, serde_json::Value>,
}

impl SyntheticEvent {
    /// Builds the fixed confirmed-user fixture for `subject_id`.
    #[must_use]
    pub fn confirmed_user(subject_id: impl Into<String>) -> Self {
        let mut user_attributes = BTreeMap::new();
        user_attributes.insert("custom:organization".to_string(), "Unit Test Inc.".to_string());
        user_attributes.insert("sub".to_string(), subject_id.into());
        user_attributes.insert(USER_STATUS_ATTRIBUTE.to_string(), CONFIRMED.to_string());
        user_attributes.insert("email_verified".to_string(), "false".to_string());
        user_attributes.insert("email".to_string(), "test@unittest.com".to_string());

        Self {
            version: "1".to_string(),
            region: "us-west-2".to_string(),
            user_pool_id: "us-west-2_dUhgFQkW4".to_string(),
            user_name: "Tester".to_string(),
            caller_context: CallerContext {
                aws_sdk_version: "aws-sdk-unknown-unknown".to_string(),
                client_id: None,
            },
            trigger_source: "PostConfirmation_ConfirmSignUp".to_string(),
            request: EventRequest { user_attributes },
            response: serde_json::Map::new(),
        }
    }

    /// Builds the fixture for one validation run.
    ///
    /// The subject is `<subject_id>-<execution_id>`, so runs for different
    /// lifecycle hook executions never share a probe key.
    #[must_use]
    pub fn for_execution(subject_id: &str, execution_id: &str) -> Self {
        Self::confirmed_user(format!("{subject_id}-{execution_id}"))
    }

    /// Returns the subject ID (`sub` attribute).
    #[must_use]
    pub fn subject_id(&self) -> &str {
        self.request
            .user_attributes
            .get("sub")
            .map_or("", String::as_str)
    }

    /// Returns the key the capture function stores this event under.
    #[must_use]
    pub fn probe_key(&self) -> String {
        record_key(self.subject_id())
    }

    /// Serializes the event as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SUBJECT_ID;

    #[test]
    fn test_fixture_shape() {
        let event = SyntheticEvent::confirmed_user(DEFAULT_SUBJECT_ID);
        let value = event.to_value().unwrap();

        assert_eq!(value["userPoolId"], "us-west-2_dUhgFQkW4");
        assert_eq!(value["triggerSource"], "PostConfirmation_ConfirmSignUp");
        assert_eq!(value["callerContext"]["clientId"], serde_json::Value::Null);
        assert_eq!(value["request"]["userAttributes"]["cognito:user_status"], "CONFIRMED");
        assert_eq!(value["request"]["userAttributes"]["sub"], DEFAULT_SUBJECT_ID);
        assert_eq!(value["response"], serde_json::json!({}));
    }

    #[test]
    fn test_probe_key_scoped_per_execution() {
        let a = SyntheticEvent::for_execution(DEFAULT_SUBJECT_ID, "exec-1");
        let b = SyntheticEvent::for_execution(DEFAULT_SUBJECT_ID, "exec-2");

        assert_eq!(a.probe_key(), format!("user_{DEFAULT_SUBJECT_ID}-exec-1.json"));
        assert_ne!(a.probe_key(), b.probe_key());
    }
}
