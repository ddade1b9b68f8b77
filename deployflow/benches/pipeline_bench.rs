//! Benchmarks for pipeline construction and canary validation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deployflow::actions::{
    ApprovalService, FnProcedure, InMemoryRepository, Procedure, ProcedureOutcome,
    ProcedureRequest,
};
use deployflow::canary::{CanaryValidator, HookInvocation, InMemoryOrchestrator};
use deployflow::capture::{CaptureHandler, LocalCandidateInvoker};
use deployflow::config::{PipelineConfig, ValidatorConfig};
use deployflow::pipeline::{standard_pipeline, DeliveryCollaborators};
use deployflow::storage::{ArtifactStore, InMemoryObjectStore};
use std::sync::Arc;
use std::time::Duration;

fn collaborators() -> DeliveryCollaborators {
    let passing = |name: &str| -> Arc<dyn Procedure> {
        Arc::new(FnProcedure::new(name, |_: &ProcedureRequest| ProcedureOutcome::passed()))
    };
    DeliveryCollaborators {
        repository: Arc::new(InMemoryRepository::new()),
        artifacts: ArtifactStore::new(Arc::new(InMemoryObjectStore::new("bench-pipeline-artifacts"))),
        build: passing("build"),
        test: passing("test"),
        deploy: passing("deploy"),
        approvals: Arc::new(ApprovalService::new()),
    }
}

fn pipeline_benchmark(c: &mut Criterion) {
    let config = PipelineConfig::new("bench");
    let collaborators = collaborators();

    c.bench_function("standard_pipeline_build", |b| {
        b.iter(|| black_box(standard_pipeline(black_box(&config), &collaborators)))
    });
}

fn canary_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };
    let store = Arc::new(InMemoryObjectStore::new("bench-probes"));
    let invoker = LocalCandidateInvoker::new("candidate", CaptureHandler::new(store.clone()));
    let validator = CanaryValidator::new(
        ValidatorConfig::new("bench-probes", "candidate").with_settling_interval(Duration::from_millis(1)),
        Arc::new(invoker),
        store,
        Arc::new(InMemoryOrchestrator::new()),
    );
    let invocation = HookInvocation::new("d-bench", "exec-bench");

    c.bench_function("canary_validation_run", |b| {
        b.iter(|| runtime.block_on(validator.run(black_box(&invocation))))
    });
}

criterion_group!(benches, pipeline_benchmark, canary_benchmark);
criterion_main!(benches);
