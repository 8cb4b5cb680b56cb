//! Shared fixtures for orchestrator integration tests

#![allow(dead_code)]

use sluice_core::domain::pipeline::{Pipeline, RetryPolicy, Stage, Task, Trigger};
use sluice_core::domain::run::Run;
use sluice_core::graph::PipelineGraph;
use sluice_orchestrator::circuit_breaker::{BreakerConfig, CircuitBreaker};
use sluice_orchestrator::engine::{EngineSettings, Orchestrator};
use sluice_orchestrator::executor::test_support;
use sluice_orchestrator::executor::{ExecutionContext, ExecutionSettings};
use sluice_orchestrator::notifier::Notifier;
use sluice_orchestrator::repository::{InMemoryRunRepository, RunRepository};
use sluice_orchestrator::runner::TaskRunner;
use sluice_orchestrator::secrets::StaticSecretProvider;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use test_support::{ScriptedRunner, stage};

pub fn all_secrets() -> StaticSecretProvider {
    test_support::secrets()
}

pub fn engine(
    graph: PipelineGraph,
    runner: Arc<dyn TaskRunner>,
    secrets: StaticSecretProvider,
) -> Arc<Orchestrator> {
    engine_with_repository(graph, runner, secrets, Arc::new(InMemoryRunRepository::new()))
}

/// Engine over an existing run log, as after a restart
pub fn engine_with_repository(
    graph: PipelineGraph,
    runner: Arc<dyn TaskRunner>,
    secrets: StaticSecretProvider,
    repository: Arc<dyn RunRepository>,
) -> Arc<Orchestrator> {
    let ctx = ExecutionContext {
        runner,
        breaker: Arc::new(CircuitBreaker::new(BreakerConfig::default())),
        secrets: Arc::new(secrets),
        repository,
        notifier: Notifier::default(),
        settings: ExecutionSettings::default(),
    };
    Orchestrator::new(graph, ctx, EngineSettings::default())
}

/// Single-attempt task
pub fn task(name: &str, command: &str) -> Task {
    Task {
        retry: RetryPolicy::once(),
        ..test_support::task(name, command)
    }
}

pub fn pipeline(name: &str, trigger: Trigger, stages: Vec<Stage>) -> Pipeline {
    test_support::pipeline(name, trigger, &[], stages)
}

/// Polls until the run reaches a terminal status
pub async fn wait_for_run(engine: &Orchestrator, run_id: Uuid) -> Run {
    for _ in 0..500 {
        let run = engine.get_run(run_id).await.unwrap();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", run_id);
}

/// Polls until the pipeline has a terminal run
pub async fn wait_for_pipeline(engine: &Orchestrator, name: &str) -> Run {
    for _ in 0..500 {
        if let Some(run) = engine.latest_run(name).await.unwrap() {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipeline {} did not finish a run", name);
}
