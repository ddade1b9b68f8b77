//! Pipeline and validator configuration.
//!
//! Configuration is an explicit record handed to the components that need
//! it. It can be built in code, loaded from a JSON file, and overridden from
//! environment variables:
//!
//! - `BUCKET_NAME`: probe record store
//! - `FN_NEW_VERSION`: candidate function identifier
//! - `DEPLOYFLOW_SETTLING_MS`: settling interval in milliseconds
//! - `DEPLOYFLOW_SERVICE`: service name (re-derives store names)
//! - `DEPLOYFLOW_BRANCH`: tracked branch

use crate::core::Environment;
use crate::errors::DeployflowError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default settling interval between the probe write and the read-back.
pub const DEFAULT_SETTLING_MS: u64 = 1500;
/// Subject ID of the synthetic confirmed-user event.
pub const DEFAULT_SUBJECT_ID: &str = "16e5bf8d-93ee-4e09-8480-689b20d6a7a6";
/// Default approval timeout (seven days).
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration of the canary validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Object store the probe record is written to.
    pub probe_store: String,
    /// Identifier of the candidate version to exercise.
    pub candidate_function: String,
    /// Wait between the probe write and the read-back, in milliseconds.
    #[serde(default = "default_settling_ms")]
    pub settling_interval_ms: u64,
    /// Subject ID of the synthetic event, before per-run scoping.
    #[serde(default = "default_subject_id")]
    pub subject_id: String,
}

fn default_settling_ms() -> u64 {
    DEFAULT_SETTLING_MS
}

fn default_subject_id() -> String {
    DEFAULT_SUBJECT_ID.to_string()
}

impl ValidatorConfig {
    /// Creates a validator configuration with the default settling interval.
    #[must_use]
    pub fn new(probe_store: impl Into<String>, candidate_function: impl Into<String>) -> Self {
        Self {
            probe_store: probe_store.into(),
            candidate_function: candidate_function.into(),
            settling_interval_ms: DEFAULT_SETTLING_MS,
            subject_id: DEFAULT_SUBJECT_ID.to_string(),
        }
    }

    /// Sets the settling interval.
    #[must_use]
    pub fn with_settling_interval(mut self, interval: Duration) -> Self {
        self.settling_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the synthetic subject ID.
    #[must_use]
    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = subject_id.into();
        self
    }

    /// Returns the settling interval.
    #[must_use]
    pub fn settling_interval(&self) -> Duration {
        Duration::from_millis(self.settling_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for empty identifiers or a zero settling interval.
    pub fn validate(&self) -> Result<(), DeployflowError> {
        if self.probe_store.trim().is_empty() {
            return Err(DeployflowError::Config("probe_store must not be empty".to_string()));
        }
        if self.candidate_function.trim().is_empty() {
            return Err(DeployflowError::Config(
                "candidate_function must not be empty".to_string(),
            ));
        }
        if self.settling_interval_ms == 0 {
            return Err(DeployflowError::Config(
                "settling_interval_ms must be positive".to_string(),
            ));
        }
        if self.subject_id.trim().is_empty() {
            return Err(DeployflowError::Config("subject_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Configuration of the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Service name; prefixes every derived resource name.
    pub service_name: String,
    /// Store holding pipeline artifacts (source snapshots, build output).
    pub artifact_store: String,
    /// Store holding packaged application artifacts.
    pub app_artifact_store: String,
    /// Tracked branch.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// How long the production approval waits, in seconds.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_approval_timeout() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

impl PipelineConfig {
    /// Creates a configuration with store names derived from `service_name`.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            artifact_store: format!("{service_name}-pipeline-artifacts"),
            app_artifact_store: format!("{service_name}-app-artifacts"),
            service_name,
            branch: default_branch(),
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
        }
    }

    /// Sets the tracked branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the approval timeout.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout_secs = timeout.as_secs();
        self
    }

    /// Returns the approval timeout.
    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    /// Returns the stack name deployed to `environment`.
    #[must_use]
    pub fn stack_name(&self, environment: Environment) -> String {
        format!("{}-app-{}", self.service_name, environment)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for empty names or a zero approval timeout.
    pub fn validate(&self) -> Result<(), DeployflowError> {
        for (field, value) in [
            ("service_name", &self.service_name),
            ("artifact_store", &self.artifact_store),
            ("app_artifact_store", &self.app_artifact_store),
            ("branch", &self.branch),
        ] {
            if value.trim().is_empty() {
                return Err(DeployflowError::Config(format!("{field} must not be empty")));
            }
        }
        if self.approval_timeout_secs == 0 {
            return Err(DeployflowError::Config(
                "approval_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration of a delivery setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// The pipeline.
    pub pipeline: PipelineConfig,
    /// The pre-traffic validator.
    pub validator: ValidatorConfig,
}

impl DeliveryConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an unparseable value.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an unparseable value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        if let Some(service) = lookup("DEPLOYFLOW_SERVICE") {
            let branch = self.pipeline.branch.clone();
            let timeout = self.pipeline.approval_timeout_secs;
            self.pipeline = PipelineConfig::new(service).with_branch(branch);
            self.pipeline.approval_timeout_secs = timeout;
        }
        if let Some(branch) = lookup("DEPLOYFLOW_BRANCH") {
            self.pipeline.branch = branch;
        }
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.validator.probe_store = bucket;
        }
        if let Some(function) = lookup("FN_NEW_VERSION") {
            self.validator.candidate_function = function;
        }
        if let Some(settling) = lookup("DEPLOYFLOW_SETTLING_MS") {
            self.validator.settling_interval_ms = settling
                .trim()
                .parse()
                .with_context(|| format!("DEPLOYFLOW_SETTLING_MS is not a number: {settling:?}"))?;
        }
        Ok(self)
    }

    /// Validates both halves of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<(), DeployflowError> {
        self.pipeline.validate()?;
        self.validator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_derived_names() {
        let config = PipelineConfig::new("new-user");
        assert_eq!(config.artifact_store, "new-user-pipeline-artifacts");
        assert_eq!(config.app_artifact_store, "new-user-app-artifacts");
        assert_eq!(config.stack_name(Environment::Staging), "new-user-app-staging");
        assert_eq!(config.stack_name(Environment::Production), "new-user-app-production");
        assert_eq!(config.branch, "master");
    }

    #[test]
    fn test_validator_defaults() {
        let config = ValidatorConfig::new("probes", "new-user:live");
        assert_eq!(config.settling_interval(), Duration::from_millis(1500));
        assert_eq!(config.subject_id, DEFAULT_SUBJECT_ID);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_and_zero() {
        assert!(ValidatorConfig::new("", "fn").validate().is_err());
        assert!(ValidatorConfig::new("probes", " ").validate().is_err());
        assert!(ValidatorConfig::new("probes", "fn")
            .with_settling_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PipelineConfig::new("svc")
            .with_approval_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "pipeline": {{
                    "service_name": "new-user",
                    "artifact_store": "new-user-pipeline-artifacts",
                    "app_artifact_store": "new-user-app-artifacts"
                }},
                "validator": {{
                    "probe_store": "new-user-data",
                    "candidate_function": "new-user:candidate"
                }}
            }}"#
        )
        .unwrap();

        let config = DeliveryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.branch, "master");
        assert_eq!(config.validator.settling_interval_ms, DEFAULT_SETTLING_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = DeliveryConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.json"));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(DeliveryConfig::from_file(&bad).is_err());
    }

    #[test]
    fn test_overrides() {
        let base = DeliveryConfig {
            pipeline: PipelineConfig::new("old").with_branch("main"),
            validator: ValidatorConfig::new("probes", "fn"),
        };
        let env: HashMap<&str, &str> = [
            ("DEPLOYFLOW_SERVICE", "new-user"),
            ("BUCKET_NAME", "new-user-data"),
            ("FN_NEW_VERSION", "new-user:2"),
            ("DEPLOYFLOW_SETTLING_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config = base
            .with_overrides(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.pipeline.artifact_store, "new-user-pipeline-artifacts");
        assert_eq!(config.pipeline.branch, "main");
        assert_eq!(config.validator.probe_store, "new-user-data");
        assert_eq!(config.validator.candidate_function, "new-user:2");
        assert_eq!(config.validator.settling_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_bad_settling_override() {
        let base = DeliveryConfig {
            pipeline: PipelineConfig::new("svc"),
            validator: ValidatorConfig::new("probes", "fn"),
        };
        let result = base.with_overrides(|name| {
            (name == "DEPLOYFLOW_SETTLING_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
