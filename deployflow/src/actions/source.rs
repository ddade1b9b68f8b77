//! Source action: captures the tracked branch into an artifact.

use super::Action;
use crate::context::ActionContext;
use crate::core::ActionOutput;
use crate::errors::ProcedureError;
use crate::storage::ArtifactStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Variable carrying the tracked branch name.
pub const BRANCH_NAME: &str = "BranchName";
/// Variable carrying the captured commit.
pub const COMMIT_ID: &str = "CommitId";

/// The latest committed state of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRevision {
    /// The commit identifier.
    pub commit_id: String,
    /// The packaged source tree.
    pub snapshot: Vec<u8>,
}

/// Source control the pipeline tracks.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Returns the latest committed revision of `branch`.
    async fn latest_revision(&self, branch: &str) -> Result<SourceRevision, ProcedureError>;
}

/// A repository held in memory, mainly for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    branches: RwLock<HashMap<String, SourceRevision>>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `branch` to a new commit.
    pub fn commit(&self, branch: &str, commit_id: impl Into<String>, snapshot: impl Into<Vec<u8>>) {
        self.branches.write().insert(
            branch.to_string(),
            SourceRevision {
                commit_id: commit_id.into(),
                snapshot: snapshot.into(),
            },
        );
    }
}

#[async_trait]
impl SourceRepository for InMemoryRepository {
    async fn latest_revision(&self, branch: &str) -> Result<SourceRevision, ProcedureError> {
        self.branches
            .read()
            .get(branch)
            .cloned()
            .ok_or_else(|| ProcedureError::new("source", format!("branch '{branch}' not found")))
    }
}

/// Fetches the latest revision of the tracked branch and stores it.
///
/// Exports only the branch name, plus the commit ID for traceability.
pub struct SourceAction {
    name: String,
    branch: String,
    repository: Arc<dyn SourceRepository>,
    artifacts: ArtifactStore,
}

impl SourceAction {
    /// Creates a source action tracking `branch`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        branch: impl Into<String>,
        repository: Arc<dyn SourceRepository>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            name: name.into(),
            branch: branch.into(),
            repository,
            artifacts,
        }
    }
}

impl std::fmt::Debug for SourceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAction")
            .field("name", &self.name)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for SourceAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        let trigger = ctx.execution().trigger();
        if trigger.branch != self.branch {
            warn!(branch = %trigger.branch, tracked = %self.branch, "Trigger for untracked branch");
            return ActionOutput::failed(format!(
                "trigger branch '{}' is not the tracked branch '{}'",
                trigger.branch, self.branch
            ));
        }

        let revision = match self.repository.latest_revision(&self.branch).await {
            Ok(revision) => revision,
            Err(e) => return ActionOutput::failed(e.to_string()),
        };

        let artifact_name = ctx.output_name().unwrap_or("SourceArtifact");
        let artifact = match self
            .artifacts
            .publish(artifact_name, &self.name, revision.snapshot)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => return ActionOutput::failed(e.to_string()),
        };

        info!(branch = %self.branch, commit = %revision.commit_id, "Source captured");

        ActionOutput::succeeded()
            .with_variable(BRANCH_NAME, &self.branch)
            .with_variable(COMMIT_ID, revision.commit_id)
            .with_artifact(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, SourceTrigger};
    use crate::core::{ActionKind, ActionStatus};
    use crate::storage::InMemoryObjectStore;
    use std::collections::BTreeMap;

    fn ctx(branch: &str) -> ActionContext {
        let execution = Arc::new(ExecutionContext::new("p", SourceTrigger::on_event(branch)));
        ActionContext::new(execution, "Source", "Repository", ActionKind::Source, BTreeMap::new())
            .with_output_name(Some("SourceArtifact".to_string()))
    }

    fn action(repo: Arc<InMemoryRepository>) -> SourceAction {
        let store = ArtifactStore::new(Arc::new(InMemoryObjectStore::new("artifacts")));
        SourceAction::new("Repository", "master", repo, store)
    }

    #[tokio::test]
    async fn test_source_captures_latest_revision() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.commit("master", "c1", b"v1".to_vec());
        repo.commit("master", "c2", b"v2".to_vec());

        let output = action(repo).execute(&ctx("master")).await;

        assert!(output.is_success());
        assert_eq!(output.variables.get(BRANCH_NAME).map(String::as_str), Some("master"));
        assert_eq!(output.variables.get(COMMIT_ID).map(String::as_str), Some("c2"));
        let artifact = output.artifact.unwrap();
        assert_eq!(artifact.name, "SourceArtifact");
        assert_eq!(artifact.digest, crate::core::content_digest(b"v2"));
    }

    #[tokio::test]
    async fn test_source_rejects_untracked_branch() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.commit("feature", "c1", b"v1".to_vec());

        let output = action(repo).execute(&ctx("feature")).await;
        assert_eq!(output.status, ActionStatus::Failed);
    }

    #[tokio::test]
    async fn test_source_missing_branch_fails() {
        let output = action(Arc::new(InMemoryRepository::new()))
            .execute(&ctx("master"))
            .await;
        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.artifact.is_none());
    }
}
