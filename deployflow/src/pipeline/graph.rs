//! Stage graph execution engine.
//!
//! Stages run strictly in declaration order. Within a stage, actions run in
//! ascending run order; actions sharing a run order are spawned concurrently
//! and the next group starts only when the whole group has finished. The
//! first `Failed` or `Rejected` action halts the execution: every action that
//! has not started is recorded as `Skipped`.

use super::spec::{ActionSpec, Binding, StageSpec};
use crate::context::{ActionContext, ExecutionContext, ExecutionId, SourceTrigger};
use crate::core::{ActionKind, ActionOutput, ActionStatus};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::run_summary;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// The action name.
    pub action: String,
    /// The action kind.
    pub kind: ActionKind,
    /// The action's run order within its stage.
    pub run_order: u32,
    /// What the action returned, after publication checks.
    pub output: ActionOutput,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl ActionResult {
    /// Returns the terminal status.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.output.status
    }

    fn skipped(spec: &ActionSpec) -> Self {
        Self {
            action: spec.name.clone(),
            kind: spec.kind,
            run_order: spec.run_order,
            output: ActionOutput::skipped(),
            duration_ms: 0.0,
        }
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    /// The stage name.
    pub name: String,
    /// `Succeeded`, `Failed`, `Rejected` or `Skipped`.
    pub status: ActionStatus,
    /// Per-action results in run order.
    pub actions: Vec<ActionResult>,
}

/// Result of executing a stage graph once.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineExecution {
    /// The execution ID.
    pub execution_id: ExecutionId,
    /// Whether every action succeeded.
    pub success: bool,
    /// Per-stage results in pipeline order, including skipped stages.
    pub stages: Vec<StageResult>,
    /// The stage that halted the execution.
    pub halted_at: Option<String>,
    /// Error message of the halting action.
    pub error: Option<String>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
}

impl PipelineExecution {
    /// Looks up a stage result.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Looks up an action result.
    #[must_use]
    pub fn action(&self, stage: &str, action: &str) -> Option<&ActionResult> {
        self.stage(stage)
            .and_then(|s| s.actions.iter().find(|a| a.action == action))
    }
}

/// A validated, executable pipeline.
///
/// Built by [`super::PipelineBuilder`]; immutable once built. Each call to
/// [`StageGraph::execute`] is an independent execution with its own
/// variable and artifact bags.
pub struct StageGraph {
    name: String,
    stages: Vec<StageSpec>,
    event_sink: Arc<dyn EventSink>,
}

impl StageGraph {
    pub(crate) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        Self {
            name,
            stages,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink used by [`StageGraph::execute`].
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the stage specifications.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Starts a new execution for `trigger`.
    pub async fn execute(&self, trigger: SourceTrigger) -> PipelineExecution {
        let ctx = ExecutionContext::new(&self.name, trigger).with_event_sink(self.event_sink.clone());
        self.execute_with(Arc::new(ctx)).await
    }

    /// Runs the pipeline against a caller-provided execution context.
    pub async fn execute_with(&self, ctx: Arc<ExecutionContext>) -> PipelineExecution {
        let start = Instant::now();
        info!(
            pipeline = %self.name,
            execution_id = %ctx.execution_id(),
            branch = %ctx.trigger().branch,
            "Pipeline execution started"
        );
        ctx.try_emit_event(
            "pipeline.started",
            Some(serde_json::json!({
                "branch": &ctx.trigger().branch,
                "stages": self.stage_names(),
            })),
        );

        let mut stages = Vec::with_capacity(self.stages.len());
        let mut halt: Option<(String, Option<String>)> = None;

        for stage in &self.stages {
            if halt.is_some() {
                stages.push(StageResult {
                    name: stage.name.clone(),
                    status: ActionStatus::Skipped,
                    actions: stage.actions.iter().map(ActionResult::skipped).collect(),
                });
                continue;
            }

            let result = self.run_stage(&ctx, stage).await;
            if result.status.halts_pipeline() {
                let error = result
                    .actions
                    .iter()
                    .find(|a| a.status().halts_pipeline())
                    .and_then(|a| a.output.error.clone());
                halt = Some((stage.name.clone(), error));
            }
            stages.push(result);
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        let (halted_at, error) = match halt {
            Some((stage, error)) => (Some(stage), error),
            None => (None, None),
        };
        let success = halted_at.is_none();

        if success {
            info!(pipeline = %self.name, duration_ms, "Pipeline execution completed");
            ctx.try_emit_event(
                "pipeline.completed",
                Some(serde_json::json!({"duration_ms": duration_ms})),
            );
        } else {
            warn!(pipeline = %self.name, halted_at = ?halted_at, error = ?error, "Pipeline execution halted");
            ctx.try_emit_event(
                "pipeline.failed",
                Some(serde_json::json!({
                    "duration_ms": duration_ms,
                    "halted_at": &halted_at,
                    "error": &error,
                })),
            );
        }

        let execution = PipelineExecution {
            execution_id: ctx.execution_id(),
            success,
            stages,
            halted_at,
            error,
            duration_ms,
        };
        debug!(summary = %run_summary(&self.name, &execution), "Pipeline run summary");
        execution
    }

    async fn run_stage(&self, ctx: &Arc<ExecutionContext>, stage: &StageSpec) -> StageResult {
        ctx.try_emit_event(
            "stage.started",
            Some(serde_json::json!({"stage": &stage.name})),
        );

        let mut actions = Vec::with_capacity(stage.actions.len());
        let mut status = ActionStatus::Succeeded;

        for (run_order, group) in stage.run_order_groups() {
            if status.halts_pipeline() {
                actions.extend(group.into_iter().map(ActionResult::skipped));
                continue;
            }

            debug!(stage = %stage.name, run_order, actions = group.len(), "Running action group");
            let results = join_all(group.iter().map(|spec| run_action(ctx, stage, spec))).await;

            // Failed wins over Rejected when both happen in one group.
            for result in &results {
                match result.status() {
                    ActionStatus::Failed => status = ActionStatus::Failed,
                    ActionStatus::Rejected if status != ActionStatus::Failed => {
                        status = ActionStatus::Rejected;
                    }
                    _ => {}
                }
            }
            actions.extend(results);
        }

        let event_type = if status.halts_pipeline() {
            "stage.failed"
        } else {
            "stage.completed"
        };
        ctx.try_emit_event(
            event_type,
            Some(serde_json::json!({"stage": &stage.name, "status": status})),
        );

        StageResult {
            name: stage.name.clone(),
            status,
            actions,
        }
    }
}

impl std::fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGraph")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

fn resolve_bindings(
    ctx: &ExecutionContext,
    spec: &ActionSpec,
) -> Result<BTreeMap<String, String>, String> {
    spec.bindings
        .iter()
        .map(|(name, binding)| {
            let value = match binding {
                Binding::Literal(value) => value.clone(),
                Binding::Variable { namespace, name: var } => ctx
                    .variables
                    .get(namespace, var)
                    .ok_or_else(|| format!("binding {name} = {binding} is unresolved"))?,
            };
            Ok((name.clone(), value))
        })
        .collect()
}

fn prepare(
    ctx: &Arc<ExecutionContext>,
    stage: &StageSpec,
    spec: &ActionSpec,
) -> Result<ActionContext, String> {
    let bindings = resolve_bindings(ctx, spec)?;
    let input = match &spec.input {
        Some(name) => Some(
            ctx.artifacts
                .get(name)
                .ok_or_else(|| format!("input artifact '{name}' is not available"))?,
        ),
        None => None,
    };

    Ok(
        ActionContext::new(ctx.clone(), &stage.name, &spec.name, spec.kind, bindings)
            .with_input(input)
            .with_output_name(spec.output.clone()),
    )
}

/// Publishes a successful action's exports, turning any publication
/// problem into a failure.
fn publish(ctx: &ExecutionContext, spec: &ActionSpec, output: ActionOutput) -> ActionOutput {
    if !output.is_success() {
        return output;
    }

    if let Some(expected) = &spec.output {
        match &output.artifact {
            Some(artifact) if &artifact.name == expected => {}
            Some(artifact) => {
                return ActionOutput::failed(format!(
                    "produced artifact '{}' but '{expected}' was declared",
                    artifact.name
                ))
            }
            None => {
                return ActionOutput::failed(format!("declared artifact '{expected}' was not produced"))
            }
        }
    }

    match &spec.namespace {
        Some(namespace) => {
            if let Err(e) = ctx.variables.publish_all(namespace, &output.variables) {
                return ActionOutput::failed(e.to_string());
            }
        }
        None if !output.variables.is_empty() => {
            debug!(action = %spec.name, "Action has no namespace; exported variables discarded");
        }
        None => {}
    }

    if let Some(artifact) = &output.artifact {
        if let Err(e) = ctx.artifacts.insert(artifact.clone()) {
            return ActionOutput::failed(e.to_string());
        }
    }

    output
}

async fn run_action(ctx: &Arc<ExecutionContext>, stage: &StageSpec, spec: &ActionSpec) -> ActionResult {
    let start = Instant::now();
    let event_data = |extra: serde_json::Value| {
        let mut data = serde_json::json!({
            "stage": &stage.name,
            "action": &spec.name,
            "kind": spec.kind,
        });
        if let (Some(map), serde_json::Value::Object(extra)) = (data.as_object_mut(), extra) {
            map.extend(extra);
        }
        data
    };

    ctx.try_emit_event("action.started", Some(event_data(serde_json::json!({}))));

    let output = match prepare(ctx, stage, spec) {
        Ok(action_ctx) => {
            let runner = spec.runner.clone();
            let handle = tokio::spawn(async move { runner.execute(&action_ctx).await });
            match handle.await {
                Ok(output) => publish(ctx, spec, output),
                Err(e) => ActionOutput::failed(format!("action task failed: {e}")),
            }
        }
        Err(reason) => ActionOutput::failed(reason),
    };

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let event_type = match output.status {
        ActionStatus::Failed => "action.failed",
        ActionStatus::Rejected => "action.rejected",
        _ => "action.completed",
    };
    match output.status {
        ActionStatus::Succeeded => {
            info!(stage = %stage.name, action = %spec.name, duration_ms, "Action succeeded");
        }
        status => {
            warn!(stage = %stage.name, action = %spec.name, %status, error = ?output.error, "Action did not succeed");
        }
    }
    ctx.try_emit_event(
        event_type,
        Some(event_data(serde_json::json!({
            "status": output.status,
            "duration_ms": duration_ms,
            "error": &output.error,
        }))),
    );

    ActionResult {
        action: spec.name.clone(),
        kind: spec.kind,
        run_order: spec.run_order,
        output,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, FnAction};
    use crate::core::{Artifact, ActionKind};
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn ok(name: &str) -> Arc<dyn Action> {
        Arc::new(FnAction::new(name, |_: &ActionContext| ActionOutput::succeeded()))
    }

    fn failing(name: &str) -> Arc<dyn Action> {
        Arc::new(FnAction::new(name, |_: &ActionContext| ActionOutput::failed("boom")))
    }

    #[derive(Debug)]
    struct Recording {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    #[async_trait]
    impl Action for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, _ctx: &ActionContext) -> ActionOutput {
            self.log.lock().push(format!("{}:start", self.name));
            tokio::time::sleep(self.delay).await;
            self.log.lock().push(format!("{}:end", self.name));
            ActionOutput::succeeded()
        }
    }

    fn recording(name: &str, log: &Arc<Mutex<Vec<String>>>, delay_ms: u64) -> Arc<dyn Action> {
        Arc::new(Recording {
            name: name.to_string(),
            log: log.clone(),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn test_variables_flow_between_stages() {
        let exporter = Arc::new(FnAction::new("Export", |_: &ActionContext| {
            ActionOutput::succeeded().with_variable("BranchName", "master")
        }));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let reader = Arc::new(FnAction::new("Read", move |ctx: &ActionContext| {
            *seen_clone.lock() = ctx.binding("GIT_BRANCH").map(String::from);
            ActionOutput::succeeded()
        }));

        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("One").with_action(
                ActionSpec::new("Export", ActionKind::Source, exporter).with_namespace("SourceVariables"),
            ))
            .stage(StageSpec::new("Two").with_action(
                ActionSpec::new("Read", ActionKind::Test, reader)
                    .bind_variable("GIT_BRANCH", "SourceVariables", "BranchName"),
            ))
            .build()
            .unwrap();

        let result = graph.execute(SourceTrigger::on_event("master")).await;

        assert!(result.success);
        assert_eq!(seen.lock().as_deref(), Some("master"));
    }

    #[tokio::test]
    async fn test_run_order_groups_sequence_and_concurrency() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stage = StageSpec::new("Stage")
            .with_action(ActionSpec::new("A", ActionKind::Test, recording("A", &log, 30)))
            .with_action(ActionSpec::new("B", ActionKind::Test, recording("B", &log, 10)))
            .with_action(ActionSpec::new("C", ActionKind::Test, recording("C", &log, 0)).with_run_order(2));

        let graph = PipelineBuilder::new("p").stage(stage).build().unwrap();
        let result = graph.execute(SourceTrigger::manual("master")).await;
        assert!(result.success);

        let log = log.lock().clone();
        let pos = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        // A and B overlap; C starts only after both end.
        assert!(pos("B:start") < pos("A:end"));
        assert!(pos("A:end") < pos("C:start"));
        assert!(pos("B:end") < pos("C:start"));
    }

    #[tokio::test]
    async fn test_failure_halts_and_skips_remaining() {
        let graph = PipelineBuilder::new("p")
            .stage(
                StageSpec::new("Build")
                    .with_action(ActionSpec::new("Build", ActionKind::Build, failing("Build")))
                    .with_action(ActionSpec::new("Lint", ActionKind::Test, ok("Lint")).with_run_order(2)),
            )
            .stage(StageSpec::new("Test").with_action(ActionSpec::new("Test", ActionKind::Test, ok("Test"))))
            .build()
            .unwrap();

        let result = graph.execute(SourceTrigger::manual("master")).await;

        assert!(!result.success);
        assert_eq!(result.halted_at.as_deref(), Some("Build"));
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.action("Build", "Build").unwrap().status(), ActionStatus::Failed);
        assert_eq!(result.action("Build", "Lint").unwrap().status(), ActionStatus::Skipped);
        assert_eq!(result.stage("Test").unwrap().status, ActionStatus::Skipped);
        assert_eq!(result.action("Test", "Test").unwrap().status(), ActionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failed_action_publishes_nothing() {
        let half = Arc::new(FnAction::new("Build", |_: &ActionContext| {
            ActionOutput::failed("broken").with_variable("ARTIFACTS_PATH", "s3://partial")
        }));
        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("Build").with_action(
                ActionSpec::new("Build", ActionKind::Build, half).with_namespace("BuildVariables"),
            ))
            .build()
            .unwrap();

        let ctx = Arc::new(ExecutionContext::new("p", SourceTrigger::manual("master")));
        let result = graph.execute_with(ctx.clone()).await;

        assert!(!result.success);
        assert!(ctx.variables.is_empty());
    }

    #[tokio::test]
    async fn test_declared_output_must_be_produced() {
        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("Source").with_action(
                ActionSpec::new("Repository", ActionKind::Source, ok("Repository"))
                    .with_output("SourceArtifact"),
            ))
            .build()
            .unwrap();

        let result = graph.execute(SourceTrigger::manual("master")).await;
        let action = result.action("Source", "Repository").unwrap();
        assert_eq!(action.status(), ActionStatus::Failed);
        assert!(action.output.error.as_deref().unwrap().contains("SourceArtifact"));
    }

    #[tokio::test]
    async fn test_input_artifact_is_handed_over() {
        let producer = Arc::new(FnAction::new("Repository", |_: &ActionContext| {
            ActionOutput::succeeded().with_artifact(Artifact::for_content(
                "store",
                "SourceArtifact",
                "Repository",
                b"snapshot",
            ))
        }));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let consumer = Arc::new(FnAction::new("Test", move |ctx: &ActionContext| {
            *seen_clone.lock() = ctx.input().map(|a| a.name.clone());
            ActionOutput::succeeded()
        }));

        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("Source").with_action(
                ActionSpec::new("Repository", ActionKind::Source, producer).with_output("SourceArtifact"),
            ))
            .stage(StageSpec::new("Test").with_action(
                ActionSpec::new("Test", ActionKind::Test, consumer).with_input("SourceArtifact"),
            ))
            .build()
            .unwrap();

        assert!(graph.execute(SourceTrigger::manual("master")).await.success);
        assert_eq!(seen.lock().as_deref(), Some("SourceArtifact"));
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("Only").with_action(ActionSpec::new("A", ActionKind::Test, ok("A"))))
            .build()
            .unwrap()
            .with_event_sink(sink.clone());

        graph.execute(SourceTrigger::manual("master")).await;

        assert_eq!(
            sink.event_types(),
            vec![
                "pipeline.started",
                "stage.started",
                "action.started",
                "action.completed",
                "stage.completed",
                "pipeline.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_executions_are_isolated() {
        let exporter = Arc::new(FnAction::new("Export", |_: &ActionContext| {
            ActionOutput::succeeded().with_variable("CommitId", "abc")
        }));
        let graph = PipelineBuilder::new("p")
            .stage(StageSpec::new("Source").with_action(
                ActionSpec::new("Export", ActionKind::Source, exporter).with_namespace("SourceVariables"),
            ))
            .build()
            .unwrap();

        let first = graph.execute(SourceTrigger::on_event("master")).await;
        let second = graph.execute(SourceTrigger::on_event("master")).await;

        // Write-once would fail the second run if bags were shared.
        assert!(first.success);
        assert!(second.success);
        assert_ne!(first.execution_id, second.execution_id);
    }
}
