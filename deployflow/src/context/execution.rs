//! Execution contexts for pipeline runs and single actions.

use super::{ArtifactBag, ExecutionId, SourceTrigger, VariableBag};
use crate::core::{ActionKind, Artifact};
use crate::events::{EventSink, NoOpEventSink};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The mutable context of one pipeline execution.
///
/// Variables and artifacts published here are visible only to actions of
/// the same execution.
pub struct ExecutionContext {
    execution_id: ExecutionId,
    pipeline: String,
    trigger: SourceTrigger,
    /// Exported variables.
    pub variables: VariableBag,
    /// Produced artifacts.
    pub artifacts: ArtifactBag,
    event_sink: Arc<dyn EventSink>,
}

impl ExecutionContext {
    /// Creates a new execution context.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, trigger: SourceTrigger) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            pipeline: pipeline.into(),
            trigger,
            variables: VariableBag::new(),
            artifacts: ArtifactBag::new(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the execution ID.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the trigger that started this execution.
    #[must_use]
    pub fn trigger(&self) -> &SourceTrigger {
        &self.trigger
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits an event tagged with the execution ID and pipeline name.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = data.unwrap_or_else(|| serde_json::json!({}));

        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert(
                "execution_id".to_string(),
                serde_json::json!(self.execution_id.to_string()),
            );
            map.insert("pipeline".to_string(), serde_json::json!(&self.pipeline));
        }

        self.event_sink.try_emit(event_type, Some(enriched));
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("pipeline", &self.pipeline)
            .field("trigger", &self.trigger)
            .field("variables", &self.variables.len())
            .field("artifacts", &self.artifacts.len())
            .finish_non_exhaustive()
    }
}

/// The view of an execution handed to a single action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    execution: Arc<ExecutionContext>,
    stage: String,
    action: String,
    kind: ActionKind,
    bindings: BTreeMap<String, String>,
    input: Option<Artifact>,
    output_name: Option<String>,
}

impl ActionContext {
    /// Creates a new action context with already-resolved bindings.
    #[must_use]
    pub fn new(
        execution: Arc<ExecutionContext>,
        stage: impl Into<String>,
        action: impl Into<String>,
        kind: ActionKind,
        bindings: BTreeMap<String, String>,
    ) -> Self {
        Self {
            execution,
            stage: stage.into(),
            action: action.into(),
            kind,
            bindings,
            input: None,
            output_name: None,
        }
    }

    /// Sets the input artifact.
    #[must_use]
    pub fn with_input(mut self, input: Option<Artifact>) -> Self {
        self.input = input;
        self
    }

    /// Sets the name under which the action's artifact must be produced.
    #[must_use]
    pub fn with_output_name(mut self, output_name: Option<String>) -> Self {
        self.output_name = output_name;
        self
    }

    /// Returns the execution this action belongs to.
    #[must_use]
    pub fn execution(&self) -> &Arc<ExecutionContext> {
        &self.execution
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the action kind.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Returns the resolved environment bindings.
    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.bindings
    }

    /// Returns one resolved binding.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Returns the input artifact.
    #[must_use]
    pub fn input(&self) -> Option<&Artifact> {
        self.input.as_ref()
    }

    /// Returns the declared output artifact name.
    #[must_use]
    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    /// Emits an event tagged with the stage and action names.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        let mut enriched = data.unwrap_or_else(|| serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = enriched {
            map.insert("stage".to_string(), serde_json::json!(&self.stage));
            map.insert("action".to_string(), serde_json::json!(&self.action));
        }
        self.execution.try_emit_event(event_type, Some(enriched));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_events_are_enriched() {
        let sink = Arc::new(CollectingEventSink::new());
        let execution = Arc::new(
            ExecutionContext::new("new-user", SourceTrigger::on_event("master"))
                .with_event_sink(sink.clone()),
        );
        let ctx = ActionContext::new(
            execution.clone(),
            "Build",
            "Build",
            ActionKind::Build,
            BTreeMap::new(),
        );

        ctx.try_emit_event("action.started", None);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let data = events[0].1.clone().unwrap();
        assert_eq!(data["stage"], "Build");
        assert_eq!(data["pipeline"], "new-user");
        assert_eq!(data["execution_id"], execution.execution_id().to_string());
    }

    #[test]
    fn test_action_context_bindings() {
        let execution = Arc::new(ExecutionContext::new("p", SourceTrigger::manual("master")));
        let mut bindings = BTreeMap::new();
        bindings.insert("ENVIRONMENT".to_string(), "staging".to_string());

        let ctx = ActionContext::new(execution, "Deploy-to-Staging", "Deploy", ActionKind::Deploy, bindings)
            .with_output_name(Some("Out".to_string()));

        assert_eq!(ctx.binding("ENVIRONMENT"), Some("staging"));
        assert_eq!(ctx.binding("STACK_NAME"), None);
        assert_eq!(ctx.output_name(), Some("Out"));
        assert!(ctx.input().is_none());
    }
}
