//! Wide summary record of a finished pipeline execution.

use crate::core::{ActionKind, ActionStatus};
use crate::pipeline::PipelineExecution;
use std::collections::BTreeMap;

/// Builds one JSON record describing a whole execution.
///
/// The record carries the overall status, action counts per status, the
/// halting stage and error (if any), and a compact per-stage breakdown.
#[must_use]
pub fn run_summary(pipeline: &str, execution: &PipelineExecution) -> serde_json::Value {
    let mut action_counts: BTreeMap<String, u32> = BTreeMap::new();
    for action in execution.stages.iter().flat_map(|s| &s.actions) {
        *action_counts.entry(action.status().to_string()).or_insert(0) += 1;
    }

    let stages: Vec<serde_json::Value> = execution
        .stages
        .iter()
        .map(|stage| {
            serde_json::json!({
                "stage": stage.name,
                "status": stage.status,
                "duration_ms": stage.actions.iter().map(|a| a.duration_ms).sum::<f64>(),
            })
        })
        .collect();

    let deployed: Vec<&str> = execution
        .stages
        .iter()
        .filter(|s| {
            s.actions
                .iter()
                .any(|a| a.kind == ActionKind::Deploy && a.status() == ActionStatus::Succeeded)
        })
        .map(|s| s.name.as_str())
        .collect();

    serde_json::json!({
        "pipeline": pipeline,
        "execution_id": execution.execution_id.to_string(),
        "status": if execution.success { "completed" } else { "failed" },
        "halted_at": execution.halted_at,
        "error": execution.error,
        "duration_ms": execution.duration_ms,
        "action_counts": action_counts,
        "deployed_stages": deployed,
        "stages": stages,
    })
}
