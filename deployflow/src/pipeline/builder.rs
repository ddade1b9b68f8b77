//! Pipeline builder with construction-time validation.

use super::spec::{validate_name, ActionSpec, StageSpec};
use super::StageGraph;
use crate::actions::ARTIFACTS_PATH;
use crate::core::{ActionKind, Environment};
use crate::errors::{ContractErrorInfo, ContractSuggestions, PipelineValidationError};
use std::collections::{HashMap, HashSet};

/// Binding naming the deployment target.
pub const ENVIRONMENT: &str = "ENVIRONMENT";
/// Binding naming the deployed stack.
pub const STACK_NAME: &str = "STACK_NAME";

/// Builder for validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage. Stages run in the order they are added.
    #[must_use]
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
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

    /// Validates the definition and builds the executable graph.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found, walking stages and run
    /// orders in execution order.
    pub fn build(self) -> Result<StageGraph, PipelineValidationError> {
        validate_name("pipeline", &self.name)?;
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                contract_info("PIPELINE-EMPTY", "Cannot build an empty pipeline"),
            ));
        }

        let namespaces = self.collect_namespaces()?;
        self.check_positions(&namespaces)?;
        for stage in &self.stages {
            for action in &stage.actions {
                if action.kind == ActionKind::Deploy {
                    check_deploy_bindings(stage, action, &namespaces)?;
                }
            }
        }

        Ok(StageGraph::new(self.name, self.stages))
    }

    /// Validates names and returns every namespace with its owning action kind.
    fn collect_namespaces(&self) -> Result<HashMap<String, ActionKind>, PipelineValidationError> {
        let mut stage_names = HashSet::new();
        let mut namespaces = HashMap::new();

        for stage in &self.stages {
            validate_name("stage", &stage.name)?;
            if !stage_names.insert(stage.name.as_str()) {
                return Err(duplicate("stage", &stage.name));
            }
            if stage.actions.is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' has no actions",
                    stage.name
                ))
                .with_stages(vec![stage.name.clone()])
                .with_error_info(ContractErrorInfo::new("PIPELINE-EMPTY", "Empty stage")));
            }

            let mut action_names = HashSet::new();
            for action in &stage.actions {
                action.validate()?;
                if !action_names.insert(action.name.as_str()) {
                    return Err(duplicate("action", &format!("{}.{}", stage.name, action.name)));
                }
                if let Some(namespace) = &action.namespace {
                    if namespaces.insert(namespace.clone(), action.kind).is_some() {
                        return Err(duplicate("namespace", namespace));
                    }
                }
            }
        }

        Ok(namespaces)
    }

    /// Checks that every variable and artifact an action consumes is
    /// produced strictly earlier in pipeline order.
    fn check_positions(
        &self,
        namespaces: &HashMap<String, ActionKind>,
    ) -> Result<(), PipelineValidationError> {
        let mut visible_namespaces: HashSet<&str> = HashSet::new();
        let mut produced: HashSet<&str> = HashSet::new();
        let mut visible_artifacts: HashSet<&str> = HashSet::new();

        for stage in &self.stages {
            for (_, group) in stage.run_order_groups() {
                for action in &group {
                    for binding in action.bindings.values() {
                        let Some(namespace) = binding.namespace() else {
                            continue;
                        };
                        if !namespaces.contains_key(namespace) {
                            return Err(reference_error(
                                "PIPELINE-UNKNOWN_NAMESPACE",
                                stage,
                                action,
                                format!("no action exports namespace '{namespace}'"),
                            ));
                        }
                        if !visible_namespaces.contains(namespace) {
                            return Err(reference_error(
                                "PIPELINE-FORWARD_REF",
                                stage,
                                action,
                                format!("namespace '{namespace}' is exported by a later action"),
                            ));
                        }
                    }

                    if let Some(input) = &action.input {
                        if !visible_artifacts.contains(input.as_str()) {
                            return Err(reference_error(
                                "PIPELINE-ARTIFACT",
                                stage,
                                action,
                                format!("input artifact '{input}' is not produced by an earlier action"),
                            ));
                        }
                    }
                    if let Some(output) = &action.output {
                        if !produced.insert(output.as_str()) {
                            return Err(reference_error(
                                "PIPELINE-ARTIFACT",
                                stage,
                                action,
                                format!("artifact '{output}' is produced by more than one action"),
                            ));
                        }
                    }
                }

                // Same run order means concurrent: the group sees its
                // exports only after all of it completes.
                for action in &group {
                    if let Some(namespace) = &action.namespace {
                        visible_namespaces.insert(namespace);
                    }
                    if let Some(output) = &action.output {
                        visible_artifacts.insert(output);
                    }
                }
            }
        }

        Ok(())
    }
}

fn contract_info(code: &str, summary: impl Into<String>) -> ContractErrorInfo {
    let info = ContractErrorInfo::new(code, summary);
    match ContractSuggestions::get(code) {
        Some(hint) => info.with_fix_hint(hint),
        None => info,
    }
}

fn duplicate(what: &str, name: &str) -> PipelineValidationError {
    PipelineValidationError::new(format!("Duplicate {what} name '{name}'"))
        .with_stages(vec![name.to_string()])
        .with_error_info(ContractErrorInfo::new(
            "PIPELINE-DUPLICATE",
            format!("{what} '{name}' is defined more than once"),
        ))
}

fn reference_error(
    code: &str,
    stage: &StageSpec,
    action: &ActionSpec,
    summary: String,
) -> PipelineValidationError {
    PipelineValidationError::new(format!(
        "Action '{}' in stage '{}': {summary}",
        action.name, stage.name
    ))
    .with_stages(vec![stage.name.clone(), action.name.clone()])
    .with_error_info(
        contract_info(code, summary)
            .with_context_entry("stage", &stage.name)
            .with_context_entry("action", &action.name),
    )
}

fn check_deploy_bindings(
    stage: &StageSpec,
    action: &ActionSpec,
    namespaces: &HashMap<String, ActionKind>,
) -> Result<(), PipelineValidationError> {
    let Some(environment) = action.bindings.get(ENVIRONMENT) else {
        return Err(reference_error(
            "PIPELINE-DEPLOY_BINDINGS",
            stage,
            action,
            format!("deploy action does not bind {ENVIRONMENT}"),
        ));
    };

    // The approval gate is decided here, so the environment must be known now.
    let Some(environment) = environment
        .as_literal()
        .and_then(|env| env.parse::<Environment>().ok())
    else {
        return Err(reference_error(
            "PIPELINE-DEPLOY_BINDINGS",
            stage,
            action,
            format!("{ENVIRONMENT} must be the literal 'staging' or 'production', got {environment}"),
        ));
    };

    let from_build = action
        .bindings
        .get(ARTIFACTS_PATH)
        .and_then(|b| b.namespace())
        .and_then(|ns| namespaces.get(ns))
        .is_some_and(|kind| *kind == ActionKind::Build);
    if !from_build {
        return Err(reference_error(
            "PIPELINE-DEPLOY_BINDINGS",
            stage,
            action,
            format!("deploy action must bind {ARTIFACTS_PATH} from a Build action's namespace"),
        ));
    }

    if environment.requires_approval() {
        let gated = stage.actions.iter().any(|other| {
            other.kind == ActionKind::ManualApproval && other.run_order < action.run_order
        });
        if !gated {
            return Err(reference_error(
                "PIPELINE-APPROVAL_ORDER",
                stage,
                action,
                "production deploy is not preceded by a manual approval".to_string(),
            ));
        }
    }

    Ok(())
}
