//! Declarative stage and action records.

use crate::actions::Action;
use crate::core::ActionKind;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Run order given to actions that do not set one.
pub const DEFAULT_RUN_ORDER: u32 = 1;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9.@_-]{1,100}$").expect("valid name pattern"))
}

/// Checks a stage, action, artifact or namespace name.
pub(crate) fn validate_name(what: &str, name: &str) -> Result<(), PipelineValidationError> {
    if name_pattern().is_match(name) {
        return Ok(());
    }
    Err(
        PipelineValidationError::new(format!("Invalid {what} name '{name}'"))
            .with_stages(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-NAME", format!("'{name}' is not a valid {what} name"))
                    .with_fix_hint("Use 1-100 characters from A-Z, a-z, 0-9, '.', '@', '_' and '-'."),
            ),
    )
}

/// The value of one environment binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// A fixed value.
    Literal(String),
    /// A variable exported by an earlier action.
    Variable {
        /// The exporting action's namespace.
        namespace: String,
        /// The variable name.
        name: String,
    },
}

impl Binding {
    /// A literal binding.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// A reference to `namespace.name`.
    #[must_use]
    pub fn variable(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Variable {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the referenced namespace, if this is a variable.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Variable { namespace, .. } => Some(namespace),
        }
    }

    /// Returns the literal value, if this is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Variable { .. } => None,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Variable { namespace, name } => write!(f, "#{{{namespace}.{name}}}"),
        }
    }
}

/// Specification of one action within a stage.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    /// Action name, unique within its stage.
    pub name: String,
    /// What the action does.
    pub kind: ActionKind,
    /// The executor.
    pub runner: Arc<dyn Action>,
    /// Name of the consumed artifact.
    pub input: Option<String>,
    /// Name of the produced artifact.
    pub output: Option<String>,
    /// Environment bindings.
    pub bindings: BTreeMap<String, Binding>,
    /// Position within the stage; lower runs first, equal runs concurrently.
    pub run_order: u32,
    /// Namespace the action's exported variables are published into.
    pub namespace: Option<String>,
}

impl ActionSpec {
    /// Creates a new action specification.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActionKind, runner: Arc<dyn Action>) -> Self {
        Self {
            name: name.into(),
            kind,
            runner,
            input: None,
            output: None,
            bindings: BTreeMap::new(),
            run_order: DEFAULT_RUN_ORDER,
            namespace: None,
        }
    }

    /// Sets the input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.input = Some(artifact.into());
        self
    }

    /// Sets the output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.output = Some(artifact.into());
        self
    }

    /// Adds a binding.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.bindings.insert(name.into(), binding);
        self
    }

    /// Adds a literal binding.
    #[must_use]
    pub fn bind_literal(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind(name, Binding::literal(value))
    }

    /// Adds a binding to another action's exported variable.
    #[must_use]
    pub fn bind_variable(
        self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.bind(name, Binding::variable(namespace, variable))
    }

    /// Sets the run order.
    #[must_use]
    pub fn with_run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }

    /// Sets the variables namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Validates the action on its own.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid names or a zero run order.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        validate_name("action", &self.name)?;
        for artifact in self.input.iter().chain(self.output.iter()) {
            validate_name("artifact", artifact)?;
        }
        if let Some(namespace) = &self.namespace {
            validate_name("namespace", namespace)?;
        }
        if self.run_order == 0 {
            return Err(PipelineValidationError::new(format!(
                "Action '{}' has run order 0; run orders start at 1",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}

/// Specification of one stage.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Stage name, unique within the pipeline.
    pub name: String,
    /// The stage's actions.
    pub actions: Vec<ActionSpec>,
}

impl StageSpec {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns the actions grouped by run order, lowest first.
    #[must_use]
    pub fn run_order_groups(&self) -> Vec<(u32, Vec<&ActionSpec>)> {
        let mut groups: BTreeMap<u32, Vec<&ActionSpec>> = BTreeMap::new();
        for action in &self.actions {
            groups.entry(action.run_order).or_default().push(action);
        }
        groups.into_iter().collect()
    }
}
