//! The standard five-stage delivery pipeline.

use super::builder::{ENVIRONMENT, STACK_NAME};
use super::spec::{ActionSpec, StageSpec};
use super::{PipelineBuilder, StageGraph};
use crate::actions::{
    ApprovalAction, ApprovalService, Procedure, ProcedureAction, SourceAction, SourceRepository,
    ARTIFACTS_PATH, BRANCH_NAME, GIT_BRANCH,
};
use crate::config::PipelineConfig;
use crate::core::{ActionKind, Environment};
use crate::errors::PipelineValidationError;
use crate::storage::ArtifactStore;
use std::sync::Arc;

/// Stage names of the standard pipeline, in order.
pub const STAGES: [&str; 5] = ["Source", "Build", "Test", "Deploy-to-Staging", "Deploy-to-Production"];
/// Namespace of the source action's exports.
pub const SOURCE_VARIABLES: &str = "SourceVariables";
/// Namespace of the build action's exports.
pub const BUILD_VARIABLES: &str = "BuildVariables";
/// Snapshot produced by the source action.
pub const SOURCE_ARTIFACT: &str = "SourceArtifact";
/// Output produced by the build action.
pub const BUILD_ARTIFACT: &str = "BuildArtifact";
/// Information shown to the production reviewer.
pub const REVIEW_INFORMATION: &str = "Ensure function works properly in Staging";

/// External systems the standard pipeline drives.
#[derive(Clone)]
pub struct DeliveryCollaborators {
    /// Source repository tracked by the pipeline.
    pub repository: Arc<dyn SourceRepository>,
    /// Store for source snapshots and build output.
    pub artifacts: ArtifactStore,
    /// Build procedure; must export `ARTIFACTS_PATH`.
    pub build: Arc<dyn Procedure>,
    /// End-to-end test procedure.
    pub test: Arc<dyn Procedure>,
    /// Deploy procedure, shared by both environments.
    pub deploy: Arc<dyn Procedure>,
    /// Approval service backing the production review.
    pub approvals: Arc<ApprovalService>,
}

impl std::fmt::Debug for DeliveryCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryCollaborators")
            .field("artifacts", &self.artifacts)
            .field("build", &self.build.name())
            .field("test", &self.test.name())
            .field("deploy", &self.deploy.name())
            .finish_non_exhaustive()
    }
}

fn deploy_action(
    config: &PipelineConfig,
    collaborators: &DeliveryCollaborators,
    environment: Environment,
) -> ActionSpec {
    let runner = ProcedureAction::new(
        "Deploy",
        ActionKind::Deploy,
        collaborators.deploy.clone(),
        collaborators.artifacts.clone(),
    );
    ActionSpec::new("Deploy", ActionKind::Deploy, Arc::new(runner))
        .with_input(SOURCE_ARTIFACT)
        .bind_literal(STACK_NAME, config.stack_name(environment))
        .bind_literal(ENVIRONMENT, environment.as_str())
        .bind_variable(ARTIFACTS_PATH, BUILD_VARIABLES, ARTIFACTS_PATH)
}

/// Builds Source, Build, Test, Deploy-to-Staging and the approval-gated
/// Deploy-to-Production stage for `config.service_name`.
///
/// # Errors
///
/// Returns an error if the service name is not a valid pipeline name.
pub fn standard_pipeline(
    config: &PipelineConfig,
    collaborators: &DeliveryCollaborators,
) -> Result<StageGraph, PipelineValidationError> {
    let source = SourceAction::new(
        "Repository",
        &config.branch,
        collaborators.repository.clone(),
        collaborators.artifacts.clone(),
    );
    let build = ProcedureAction::new(
        "Build",
        ActionKind::Build,
        collaborators.build.clone(),
        collaborators.artifacts.clone(),
    );
    let test = ProcedureAction::new(
        "Test",
        ActionKind::Test,
        collaborators.test.clone(),
        collaborators.artifacts.clone(),
    );
    let review = ApprovalAction::new(
        "Review",
        REVIEW_INFORMATION,
        config.approval_timeout(),
        collaborators.approvals.clone(),
    );

    PipelineBuilder::new(&config.service_name)
        .stage(StageSpec::new(STAGES[0]).with_action(
            ActionSpec::new("Repository", ActionKind::Source, Arc::new(source))
                .with_output(SOURCE_ARTIFACT)
                .with_namespace(SOURCE_VARIABLES),
        ))
        .stage(StageSpec::new(STAGES[1]).with_action(
            ActionSpec::new("Build", ActionKind::Build, Arc::new(build))
                .with_input(SOURCE_ARTIFACT)
                .with_output(BUILD_ARTIFACT)
                .bind_literal("S3_BUCKET", &config.app_artifact_store)
                .bind_variable(GIT_BRANCH, SOURCE_VARIABLES, BRANCH_NAME)
                .with_namespace(BUILD_VARIABLES),
        ))
        .stage(StageSpec::new(STAGES[2]).with_action(
            ActionSpec::new("Test", ActionKind::Test, Arc::new(test))
                .with_input(SOURCE_ARTIFACT)
                .bind_literal("E2E_TEST", "true"),
        ))
        .stage(
            StageSpec::new(STAGES[3])
                .with_action(deploy_action(config, collaborators, Environment::Staging)),
        )
        .stage(
            StageSpec::new(STAGES[4])
                .with_action(
                    ActionSpec::new("Review", ActionKind::ManualApproval, Arc::new(review))
                        .with_run_order(1),
                )
                .with_action(
                    deploy_action(config, collaborators, Environment::Production).with_run_order(2),
                ),
        )
        .build()
}
