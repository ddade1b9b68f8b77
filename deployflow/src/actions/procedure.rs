//! External build, test and deploy procedures.
//!
//! A procedure is an opaque executable that consumes named environment
//! bindings and reports pass/fail plus exported variables. Build procedures
//! must export [`ARTIFACTS_PATH`].

use super::Action;
use crate::context::ActionContext;
use crate::core::{ActionKind, ActionOutput, Artifact};
use crate::errors::ProcedureError;
use crate::storage::ArtifactStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Variable holding the resolved location of the build output.
pub const ARTIFACTS_PATH: &str = "ARTIFACTS_PATH";
/// Variable holding the branch forwarded from the source stage.
pub const GIT_BRANCH: &str = "GIT_BRANCH";

/// Everything a procedure is given for one run.
#[derive(Debug, Clone)]
pub struct ProcedureRequest {
    /// The action running the procedure.
    pub action: String,
    /// The action kind.
    pub kind: ActionKind,
    /// Resolved environment bindings.
    pub env: BTreeMap<String, String>,
    /// The input artifact handle.
    pub input: Option<Artifact>,
    /// The input artifact content.
    pub input_content: Option<Vec<u8>>,
}

/// What a procedure reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureOutcome {
    /// Whether the procedure passed.
    pub passed: bool,
    /// Variables exported by the procedure.
    pub exported: BTreeMap<String, String>,
    /// Output content to publish as the action's artifact.
    pub output: Option<Vec<u8>>,
    /// Diagnostic message (e.g. captured stderr).
    pub message: Option<String>,
}

impl ProcedureOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    /// A failing outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Adds an exported variable.
    #[must_use]
    pub fn export(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.exported.insert(name.into(), value.into());
        self
    }

    /// Sets the output content.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// An externally defined build/test/deploy procedure.
#[async_trait]
pub trait Procedure: Send + Sync {
    /// Returns the procedure name.
    fn name(&self) -> &str;

    /// Runs the procedure.
    ///
    /// `Err` means the procedure could not be run at all; a procedure that
    /// ran and failed returns `Ok` with `passed == false`.
    async fn run(&self, request: ProcedureRequest) -> Result<ProcedureOutcome, ProcedureError>;
}

/// A procedure backed by a closure.
pub struct FnProcedure<F>
where
    F: Fn(&ProcedureRequest) -> ProcedureOutcome + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnProcedure<F>
where
    F: Fn(&ProcedureRequest) -> ProcedureOutcome + Send + Sync,
{
    /// Creates a new closure-backed procedure.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Procedure for FnProcedure<F>
where
    F: Fn(&ProcedureRequest) -> ProcedureOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: ProcedureRequest) -> Result<ProcedureOutcome, ProcedureError> {
        Ok((self.func)(&request))
    }
}

/// Runs a shell command as the procedure.
///
/// Bindings are passed as environment variables. Declared exports are read
/// from stdout lines of the form `NAME=value`; the last occurrence wins.
#[derive(Debug, Clone)]
pub struct CommandProcedure {
    name: String,
    command: String,
    exports: Vec<String>,
    timeout: Duration,
}

impl CommandProcedure {
    /// Creates a command procedure with a ten minute timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            exports: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Declares variables to read from stdout.
    #[must_use]
    pub fn with_exports(mut self, exports: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exports = exports.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_exports(&self, stdout: &str) -> BTreeMap<String, String> {
        stdout
            .lines()
            .filter_map(|line| line.trim().split_once('='))
            .filter(|(name, _)| self.exports.iter().any(|e| e == name))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

#[async_trait]
impl Procedure for CommandProcedure {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, request: ProcedureRequest) -> Result<ProcedureOutcome, ProcedureError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .envs(&request.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(input) = &request.input {
            command.env("INPUT_ARTIFACT", &input.location);
        }

        let child = command
            .spawn()
            .map_err(|e| ProcedureError::new(&self.name, e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProcedureError::new(
                    &self.name,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| ProcedureError::new(&self.name, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(procedure = %self.name, code = ?output.status.code(), "Procedure exited");

        if output.status.success() {
            Ok(ProcedureOutcome {
                passed: true,
                exported: self.parse_exports(&stdout),
                output: None,
                message: None,
            })
        } else {
            Ok(ProcedureOutcome::failed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )))
        }
    }
}

/// Runs a [`Procedure`] as a Build, Test or Deploy action.
pub struct ProcedureAction {
    name: String,
    kind: ActionKind,
    procedure: Arc<dyn Procedure>,
    artifacts: ArtifactStore,
}

impl ProcedureAction {
    /// Creates a procedure-backed action.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ActionKind,
        procedure: Arc<dyn Procedure>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            procedure,
            artifacts,
        }
    }

    async fn publish_output(
        &self,
        ctx: &ActionContext,
        outcome: &ProcedureOutcome,
        exported: &BTreeMap<String, String>,
    ) -> Result<Option<Artifact>, String> {
        let Some(output_name) = ctx.output_name() else {
            return Ok(None);
        };
        // Procedures that write their output elsewhere get a manifest instead.
        let content = match &outcome.output {
            Some(content) => content.clone(),
            None => serde_json::to_vec(&serde_json::json!({
                "action": &self.name,
                "variables": exported,
            }))
            .map_err(|e| e.to_string())?,
        };
        self.artifacts
            .publish(output_name, &self.name, content)
            .await
            .map(Some)
            .map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for ProcedureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureAction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("procedure", &self.procedure.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for ProcedureAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let input_content = match ctx.input() {
            Some(input) => match self.artifacts.fetch(input).await {
                Ok(content) => Some(content),
                Err(e) => return ActionOutput::failed(e.to_string()),
            },
            None => None,
        };

        let request = ProcedureRequest {
            action: self.name.clone(),
            kind: self.kind,
            env: ctx.bindings().clone(),
            input: ctx.input().cloned(),
            input_content,
        };

        info!(action = %self.name, procedure = %self.procedure.name(), kind = %self.kind, "Running procedure");
        let outcome = match self.procedure.run(request).await {
            Ok(outcome) => outcome,
            Err(e) => return ActionOutput::failed(e.to_string()),
        };

        if !outcome.passed {
            warn!(action = %self.name, message = ?outcome.message, "Procedure failed");
            return ActionOutput::failed(
                outcome
                    .message
                    .unwrap_or_else(|| format!("procedure '{}' failed", self.procedure.name())),
            );
        }

        let mut exported = outcome.exported.clone();
        if self.kind == ActionKind::Build {
            if !exported.contains_key(ARTIFACTS_PATH) {
                return ActionOutput::failed(format!(
                    "build procedure '{}' did not export {ARTIFACTS_PATH}",
                    self.procedure.name()
                ));
            }
            if let Some(branch) = ctx.binding(GIT_BRANCH) {
                exported
                    .entry(GIT_BRANCH.to_string())
                    .or_insert_with(|| branch.to_string());
            }
        }

        let artifact = match self.publish_output(ctx, &outcome, &exported).await {
            Ok(artifact) => artifact,
            Err(e) => return ActionOutput::failed(e),
        };

        let output = ActionOutput::succeeded().with_variables(exported);
        match artifact {
            Some(artifact) => output.with_artifact(artifact),
            None => output,
        }
    }
}
