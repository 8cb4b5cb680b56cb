//! Scripted collaborators for executor and engine tests
//!
//! Also compiled with the `test-support` feature so integration tests can
//! share them.

use async_trait::async_trait;
use sluice_core::domain::pipeline::{Pipeline, RetryPolicy, RunCondition, Stage, Task, Trigger};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExecutionContext, ExecutionSettings, RunScope};
use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::notifier::Notifier;
use crate::repository::InMemoryRunRepository;
use crate::runner::{TaskInvocation, TaskResult, TaskRunner, Termination};
use crate::secrets::{SecretSet, StaticSecretProvider};

/// Task runner replaying scripted outcomes per program
///
/// Programs without a script succeed. Blocking programs wait until
/// cancelled.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Termination>>>,
    blocking: HashSet<String>,
    calls: Mutex<Vec<(String, Instant)>>,
    invocations: Mutex<Vec<TaskInvocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, program: &str, outcomes: Vec<Termination>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), outcomes.into());
        self
    }

    pub fn blocking(mut self, program: &str) -> Self {
        self.blocking.insert(program.to_string());
        self
    }

    pub fn calls_for(&self, program: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == program)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn last_invocation(&self) -> Option<TaskInvocation> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn execute(
        &self,
        invocation: &TaskInvocation,
        cancel: &CancellationToken,
    ) -> TaskResult {
        self.calls
            .lock()
            .unwrap()
            .push((invocation.program.clone(), Instant::now()));
        self.invocations.lock().unwrap().push(invocation.clone());

        let termination = if self.blocking.contains(&invocation.program) {
            cancel.cancelled().await;
            Termination::Cancelled
        } else {
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&invocation.program)
                .and_then(|script| script.pop_front())
                .unwrap_or(Termination::Exited(0))
        };

        TaskResult {
            termination,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }
}

pub fn secrets() -> StaticSecretProvider {
    StaticSecretProvider::new()
        .with("COSMOS-DB-KEY", "cosmos-secret")
        .with("OPENAI-API-KEY", "sk-secret")
}

pub fn context(runner: Arc<ScriptedRunner>) -> ExecutionContext {
    ExecutionContext {
        runner,
        breaker: Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 100,
            cooldown: Duration::from_secs(60),
        })),
        secrets: Arc::new(secrets()),
        repository: Arc::new(InMemoryRunRepository::new()),
        notifier: Notifier::default(),
        settings: ExecutionSettings::default(),
    }
}

pub fn task(name: &str, command: &str) -> Task {
    Task {
        name: name.to_string(),
        command: command.to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
        secrets: Vec::new(),
        retry: RetryPolicy::default(),
        best_effort: false,
        timeout_seconds: None,
        dependency: None,
        working_dir: None,
    }
}

pub fn stage(name: &str, depends_on: &[&str], tasks: Vec<Task>) -> Stage {
    Stage {
        name: name.to_string(),
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        condition: RunCondition::Always,
        tasks,
        quality_gate: None,
    }
}

pub fn pipeline(name: &str, trigger: Trigger, upstream: &[&str], stages: Vec<Stage>) -> Pipeline {
    Pipeline {
        name: name.to_string(),
        description: None,
        trigger,
        upstream: upstream.iter().map(|u| u.to_string()).collect(),
        variables: BTreeMap::new(),
        stages,
    }
}

pub fn scope(variables: BTreeMap<String, String>) -> RunScope {
    RunScope {
        pipeline: "test".to_string(),
        run_id: Uuid::new_v4(),
        variables,
        secrets: SecretSet::from_iter([
            ("COSMOS-DB-KEY".to_string(), "cosmos-secret".to_string()),
            ("OPENAI-API-KEY".to_string(), "sk-secret".to_string()),
        ]),
    }
}
