//! Action trait and the executors behind each pipeline action kind.
//!
//! Actions are the units of work inside a stage. The pipeline resolves an
//! action's bindings and input artifact, hands it an [`ActionContext`] and
//! records the returned [`ActionOutput`].

mod approval;
mod procedure;
mod source;

pub use approval::{ApprovalAction, ApprovalDecision, ApprovalService, PendingApproval};
pub use procedure::{
    CommandProcedure, FnProcedure, Procedure, ProcedureAction, ProcedureOutcome,
    ProcedureRequest, ARTIFACTS_PATH, GIT_BRANCH,
};
pub use source::{
    InMemoryRepository, SourceAction, SourceRepository, SourceRevision, BRANCH_NAME, COMMIT_ID,
};

use crate::context::ActionContext;
use crate::core::ActionOutput;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline actions.
#[async_trait]
pub trait Action: Send + Sync + Debug {
    /// Returns the name of the action.
    fn name(&self) -> &str;

    /// Executes the action.
    ///
    /// Failures are reported through the returned output, never by panicking.
    async fn execute(&self, ctx: &ActionContext) -> ActionOutput;
}

/// A simple function-based action.
pub struct FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    /// Creates a new function-based action.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(&ActionContext) -> ActionOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &ActionContext) -> ActionOutput {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, SourceTrigger};
    use crate::core::ActionKind;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_action_sees_bindings() {
        let action = FnAction::new("echo", |ctx: &ActionContext| {
            match ctx.binding("ENVIRONMENT") {
                Some(env) => ActionOutput::succeeded().with_variable("SEEN", env),
                None => ActionOutput::failed("no environment"),
            }
        });

        let execution = Arc::new(ExecutionContext::new("p", SourceTrigger::manual("master")));
        let mut bindings = BTreeMap::new();
        bindings.insert("ENVIRONMENT".to_string(), "staging".to_string());
        let ctx = ActionContext::new(execution, "s", "echo", ActionKind::Deploy, bindings);

        let output = action.execute(&ctx).await;
        assert_eq!(action.name(), "echo");
        assert_eq!(output.variables.get("SEEN").map(String::as_str), Some("staging"));
    }
}
