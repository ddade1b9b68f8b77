//! Action kind, action status and deployment environment enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetches the tracked branch from source control.
    Source,
    /// Runs the build procedure and publishes the build artifact.
    Build,
    /// Runs the test procedure against the source artifact.
    Test,
    /// Waits for a human to approve or reject.
    ManualApproval,
    /// Runs the deployment procedure for one environment.
    Deploy,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Build => write!(f, "build"),
            Self::Test => write!(f, "test"),
            Self::ManualApproval => write!(f, "manual_approval"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// The execution status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Failed; halts the pipeline.
    Failed,
    /// Approval was rejected or timed out; halts the pipeline.
    Rejected,
    /// Never ran because an earlier action halted the pipeline.
    Skipped,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Rejected | Self::Skipped
        )
    }

    /// Returns true if the status halts the pipeline.
    #[must_use]
    pub fn halts_pipeline(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected)
    }
}

/// A deployment target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Pre-production environment, deployed without a gate.
    Staging,
    /// Live environment, deployed only after manual approval.
    Production,
}

impl Environment {
    /// Returns the environment identifier used in bindings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Returns true if deploying to this environment requires approval.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}
