//! Orchestrator engine
//!
//! Owns the pipeline graph and the per-pipeline admission state. At most one
//! run per pipeline is active. Overlapping cron fires are dropped; push,
//! manual and upstream-triggered runs wait in a bounded queue that drops its
//! oldest entry on overflow.

use chrono::Utc;
use sluice_core::domain::event::{Event, EventKind, RunCompleted};
use sluice_core::domain::pipeline::{Pipeline, Trigger};
use sluice_core::domain::run::{Run, RunCause, RunStatus};
use sluice_core::dto::event::{PushEvent, TriggerOutcome, TriggerResponse};
use sluice_core::error::{ErrorKind, SluiceError};
use sluice_core::graph::PipelineGraph;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::CompletionBus;
use crate::executor::{ExecutionContext, execute_run};
use crate::repository::RepositoryError;
use crate::scheduler::{CronTicker, TriggerEvent, can_start, resolve_cause};

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pipeline '{0}' not found")]
    PipelineNotFound(String),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Core(#[from] SluiceError),
}

/// Admission tunables
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Queued runs kept per pipeline while one is active
    pub queue_depth: usize,
    /// How often cron schedules are evaluated
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_depth: 10,
            poll_interval: Duration::from_secs(30),
        }
    }
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

#[derive(Default)]
struct PipelineSlot {
    active: Option<ActiveRun>,
    queue: VecDeque<Run>,
}

pub struct Orchestrator {
    graph: PipelineGraph,
    ctx: ExecutionContext,
    bus: CompletionBus,
    settings: EngineSettings,
    slots: Mutex<HashMap<String, PipelineSlot>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(graph: PipelineGraph, ctx: ExecutionContext, settings: EngineSettings) -> Arc<Self> {
        Arc::new(Self {
            graph,
            ctx,
            bus: CompletionBus::default(),
            settings,
            slots: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn pipeline(&self, name: &str) -> Result<&Pipeline, EngineError> {
        self.graph
            .pipeline(name)
            .ok_or_else(|| EngineError::PipelineNotFound(name.to_string()))
    }

    /// Completion events of every run
    pub fn subscribe(&self) -> broadcast::Receiver<RunCompleted> {
        self.bus.subscribe()
    }

    /// Spawns the dependency listener and the cron loop
    pub fn start(self: &Arc<Self>) {
        let completions = self.bus.subscribe();
        tokio::spawn(Arc::clone(self).listen_for_completions(completions));
        tokio::spawn(Arc::clone(self).cron_loop());

        tracing::info!(
            pipelines = self.graph.len(),
            queue_depth = self.settings.queue_depth,
            "Orchestrator started"
        );
    }

    /// Cancels active runs and stops background loops
    pub fn shutdown(&self) {
        tracing::info!("Orchestrator shutting down");
        self.shutdown.cancel();
    }

    /// Offers a trigger event to one pipeline
    pub async fn schedule(
        self: &Arc<Self>,
        name: &str,
        event: TriggerEvent,
    ) -> Result<TriggerOutcome, EngineError> {
        let pipeline = self.pipeline(name)?;

        let Some(cause) = resolve_cause(pipeline, &event) else {
            return Ok(TriggerOutcome::skipped(
                format!("event does not match trigger {}", pipeline.trigger),
                None,
            ));
        };

        // Manual runs bypass upstream gating
        if cause != RunCause::Manual {
            let readiness = can_start(&self.graph, self.ctx.repository.as_ref(), name).await?;
            if !readiness.is_ready() {
                tracing::info!(pipeline = name, "Not starting: {}", readiness);
                return Ok(TriggerOutcome::skipped(
                    readiness.to_string(),
                    Some(ErrorKind::UpstreamNotReady),
                ));
            }
        }

        let overrides = match event {
            TriggerEvent::Manual { variables } => variables,
            _ => BTreeMap::new(),
        };
        let run = Run::queued(pipeline, cause, overrides);
        for gate in pipeline.stages.iter().filter_map(|s| s.quality_gate.as_ref()) {
            gate.thresholds(&run.variables, self.ctx.settings.hard_floor)?;
        }

        let mut slots = self.slots.lock().await;
        let slot = slots.entry(name.to_string()).or_default();

        if let Some(active) = &slot.active {
            if matches!(run.cause, RunCause::Schedule { .. }) {
                let reason = format!("run {} is still active", active.run_id);
                tracing::info!(pipeline = name, "Scheduled fire skipped: {}", reason);
                self.ctx.notifier.emit(Event::new(
                    EventKind::RunSkipped,
                    name,
                    None,
                    format!("scheduled fire skipped, {}", reason),
                ));
                return Ok(TriggerOutcome::skipped(reason, None));
            }

            self.ctx.repository.insert(&run).await?;
            let run_id = run.id;
            slot.queue.push_back(run);

            while slot.queue.len() > self.settings.queue_depth {
                if let Some(mut dropped) = slot.queue.pop_front() {
                    tracing::warn!(
                        pipeline = name,
                        run_id = %dropped.id,
                        "Queue full, dropping oldest queued run"
                    );
                    dropped.interrupt("dropped from a full queue")?;
                    self.ctx.repository.update(&dropped).await?;
                    self.notify_cancelled(&dropped);
                    self.publish(&dropped);
                }
            }

            tracing::info!(pipeline = name, %run_id, depth = slot.queue.len(), "Run queued");
            return Ok(TriggerOutcome::Queued {
                run_id,
                depth: slot.queue.len(),
            });
        }

        self.ctx.repository.insert(&run).await?;
        let run_id = run.id;
        self.launch(slot, run);

        Ok(TriggerOutcome::Started { run_id })
    }

    /// Manually triggers a pipeline with variable overrides
    pub async fn trigger(
        self: &Arc<Self>,
        name: &str,
        variables: BTreeMap<String, String>,
    ) -> Result<TriggerOutcome, EngineError> {
        self.schedule(name, TriggerEvent::Manual { variables }).await
    }

    /// Offers a branch push to every pipeline triggered by that branch
    pub async fn push(self: &Arc<Self>, event: PushEvent) -> Result<Vec<TriggerResponse>, EngineError> {
        let targets: Vec<String> = self
            .graph
            .pipelines()
            .filter(|p| matches!(&p.trigger, Trigger::BranchPush { branch } if *branch == event.branch))
            .map(|p| p.name.clone())
            .collect();

        tracing::info!(branch = %event.branch, matched = targets.len(), "Push received");

        let mut responses = Vec::with_capacity(targets.len());
        for name in targets {
            let outcome = self
                .schedule(
                    &name,
                    TriggerEvent::Push {
                        branch: event.branch.clone(),
                        commit: event.commit.clone(),
                    },
                )
                .await?;
            responses.push(TriggerResponse {
                pipeline: name,
                outcome,
            });
        }
        Ok(responses)
    }

    /// Cancels an active or queued run.
    ///
    /// A run recorded as unfinished that no slot owns, e.g. one left behind by
    /// a previous process, is finalized directly.
    pub async fn cancel(&self, run_id: Uuid) -> Result<Run, EngineError> {
        let run = self
            .ctx
            .repository
            .get(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {} already {}",
                run_id, run.status
            )));
        }

        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&run.pipeline);

        if let Some(active) = slot
            .as_ref()
            .and_then(|slot| slot.active.as_ref())
            .filter(|a| a.run_id == run_id)
        {
            tracing::info!(%run_id, "Cancelling active run");
            active.cancel.cancel();
            return Ok(run);
        }

        let queued = slot.and_then(|slot| {
            let position = slot.queue.iter().position(|r| r.id == run_id)?;
            slot.queue.remove(position)
        });
        let (mut run, reason) = match queued {
            Some(queued) => (queued, "cancelled while queued"),
            None => {
                // Re-read under the lock: the executor may have finished it meanwhile
                let Some(stored) = self.ctx.repository.get(run_id).await? else {
                    return Err(EngineError::RunNotFound(run_id));
                };
                if stored.status.is_terminal() {
                    return Err(EngineError::InvalidState(format!(
                        "run {} already {}",
                        run_id, stored.status
                    )));
                }
                (stored, "cancelled while orphaned")
            }
        };
        drop(slots);

        tracing::info!(%run_id, pipeline = %run.pipeline, "Cancelling run: {}", reason);
        run.interrupt(reason)?;
        self.ctx.repository.update(&run).await?;
        self.notify_cancelled(&run);
        self.publish(&run);

        Ok(run)
    }

    /// Finalizes runs a previous process left queued or running.
    ///
    /// Called once before `start`. Returns how many runs were cancelled.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let unfinished = self.ctx.repository.list_unfinished().await?;
        let slots = self.slots.lock().await;

        let mut recovered = 0;
        for mut run in unfinished {
            let owned = slots.get(&run.pipeline).is_some_and(|slot| {
                slot.active.as_ref().is_some_and(|a| a.run_id == run.id)
                    || slot.queue.iter().any(|r| r.id == run.id)
            });
            if owned {
                continue;
            }

            tracing::warn!(
                pipeline = %run.pipeline,
                run_id = %run.id,
                status = %run.status,
                "Cancelling run interrupted by orchestrator restart"
            );
            run.interrupt("interrupted by orchestrator restart")?;
            self.ctx.repository.update(&run).await?;
            self.notify_cancelled(&run);
            recovered += 1;
        }

        if recovered > 0 {
            tracing::info!(recovered, "Recovered unfinished runs");
        }
        Ok(recovered)
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Run, EngineError> {
        self.ctx
            .repository
            .get(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Runs of a pipeline, newest first
    pub async fn list_runs(&self, name: &str) -> Result<Vec<Run>, EngineError> {
        self.pipeline(name)?;
        Ok(self.ctx.repository.list_by_pipeline(name).await?)
    }

    pub async fn recent_runs(&self, limit: usize) -> Result<Vec<Run>, EngineError> {
        Ok(self.ctx.repository.list_recent(limit).await?)
    }

    /// Latest run of a pipeline, whatever its status
    pub async fn latest_run(&self, name: &str) -> Result<Option<Run>, EngineError> {
        self.pipeline(name)?;
        Ok(self.ctx.repository.latest(name).await?)
    }

    /// Latest run of a pipeline that reached a terminal status
    pub async fn latest_completed_run(&self, name: &str) -> Result<Option<Run>, EngineError> {
        self.pipeline(name)?;
        Ok(self.ctx.repository.latest_terminal(name).await?)
    }

    /// Cross-pipeline trigger interface
    pub async fn latest_run_status(&self, name: &str) -> Result<Option<RunStatus>, EngineError> {
        Ok(self.latest_run(name).await?.map(|run| run.status))
    }

    fn launch(self: &Arc<Self>, slot: &mut PipelineSlot, run: Run) {
        let cancel = self.shutdown.child_token();
        slot.active = Some(ActiveRun {
            run_id: run.id,
            cancel: cancel.clone(),
        });
        tokio::spawn(Arc::clone(self).drive(run, cancel));
    }

    /// Executes a run, then every run queued behind it
    async fn drive(self: Arc<Self>, mut run: Run, mut cancel: CancellationToken) {
        loop {
            let Some(pipeline) = self.graph.pipeline(&run.pipeline) else {
                tracing::error!(pipeline = %run.pipeline, "Pipeline disappeared from graph");
                return;
            };

            let finished = execute_run(&self.ctx, pipeline, run, cancel).await;
            self.publish(&finished);

            match self.release(&finished).await {
                Some((next, token)) => {
                    run = next;
                    cancel = token;
                }
                None => return,
            }
        }
    }

    /// Frees the pipeline slot and claims it for the next queued run
    async fn release(&self, finished: &Run) -> Option<(Run, CancellationToken)> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&finished.pipeline)?;

        if slot.active.as_ref().is_some_and(|a| a.run_id == finished.id) {
            slot.active = None;
        }
        if self.shutdown.is_cancelled() {
            return None;
        }

        let next = slot.queue.pop_front()?;
        let cancel = self.shutdown.child_token();
        slot.active = Some(ActiveRun {
            run_id: next.id,
            cancel: cancel.clone(),
        });
        tracing::info!(pipeline = %next.pipeline, run_id = %next.id, "Starting queued run");
        Some((next, cancel))
    }

    fn notify_cancelled(&self, run: &Run) {
        let message = run
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "cancelled".to_string());
        self.ctx.notifier.emit(Event::new(
            EventKind::RunCancelled,
            &run.pipeline,
            Some(run.id),
            message,
        ));
    }

    fn publish(&self, run: &Run) {
        self.bus.publish(RunCompleted {
            pipeline: run.pipeline.clone(),
            run_id: run.id,
            status: run.status,
            completed_at: run.completed_at.unwrap_or_else(Utc::now),
        });
    }

    /// Triggers downstream pipelines when an upstream run completes
    async fn listen_for_completions(
        self: Arc<Self>,
        mut completions: broadcast::Receiver<RunCompleted>,
    ) {
        loop {
            let completed = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                received = completions.recv() => match received {
                    Ok(completed) => completed,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Dependency listener lagged behind completions");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            };

            let downstream: Vec<String> = self
                .graph
                .downstream_of(&completed.pipeline)
                .into_iter()
                .map(String::from)
                .collect();

            for name in downstream {
                let event = TriggerEvent::UpstreamCompleted {
                    pipeline: completed.pipeline.clone(),
                    run_id: completed.run_id,
                    status: completed.status,
                };
                match self.schedule(&name, event).await {
                    Ok(TriggerOutcome::Skipped { reason, .. }) => {
                        tracing::debug!(pipeline = %name, upstream = %completed.pipeline, "Downstream not triggered: {}", reason)
                    }
                    Ok(outcome) => {
                        tracing::info!(pipeline = %name, upstream = %completed.pipeline, ?outcome, "Downstream triggered")
                    }
                    Err(e) => {
                        tracing::error!(pipeline = %name, "Failed to trigger downstream: {}", e)
                    }
                }
            }
        }
    }

    /// Fires scheduled pipelines on their cron boundaries
    async fn cron_loop(self: Arc<Self>) {
        let mut ticker = CronTicker::new(&self.graph, Utc::now());
        if ticker.is_empty() {
            return;
        }

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            for (name, fired_at) in ticker.due(Utc::now()) {
                tracing::debug!(pipeline = %name, %fired_at, "Cron boundary reached");
                if let Err(e) = self.schedule(&name, TriggerEvent::Cron { fired_at }).await {
                    tracing::error!(pipeline = %name, "Failed to schedule cron run: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::{ScriptedRunner, context, pipeline, stage, task};
    use sluice_core::domain::pipeline::{QualityCheck, QualityGateSpec};
    use sluice_core::domain::quality::THRESHOLD_VARIABLE;

    fn graph() -> PipelineGraph {
        PipelineGraph::build(vec![
            pipeline(
                "main-ci",
                Trigger::BranchPush {
                    branch: "main".to_string(),
                },
                &[],
                vec![stage("build", &[], vec![task("build", "build")])],
            ),
            pipeline(
                "nightly",
                Trigger::Scheduled {
                    cron: "0 2 * * *".to_string(),
                },
                &[],
                vec![stage("train", &[], vec![task("train", "train")])],
            ),
        ])
        .unwrap()
    }

    async fn wait_for(engine: &Orchestrator, run_id: Uuid) -> Run {
        let mut completions = engine.subscribe();
        loop {
            let run = engine.get_run(run_id).await.unwrap();
            if run.status.is_terminal() {
                return run;
            }
            let _ = tokio::time::timeout(Duration::from_millis(50), completions.recv()).await;
        }
    }

    #[tokio::test]
    async fn test_push_queue_drops_oldest() {
        let runner = Arc::new(ScriptedRunner::new().blocking("build"));
        let engine = Orchestrator::new(
            graph(),
            context(runner),
            EngineSettings {
                queue_depth: 2,
                ..Default::default()
            },
        );
        let push = || PushEvent {
            branch: "main".to_string(),
            commit: None,
        };

        let first = engine.push(push()).await.unwrap();
        assert!(matches!(first[0].outcome, TriggerOutcome::Started { .. }));

        let mut queued = Vec::new();
        for _ in 0..3 {
            match engine.push(push()).await.unwrap().remove(0).outcome {
                TriggerOutcome::Queued { run_id, depth } => {
                    assert!(depth <= 2);
                    queued.push(run_id);
                }
                other => panic!("expected queued, got {:?}", other),
            }
        }

        let dropped = engine.get_run(queued[0]).await.unwrap();
        assert_eq!(dropped.status, RunStatus::Cancelled);
        assert_eq!(dropped.failure.unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(engine.get_run(queued[2]).await.unwrap().status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_push_for_other_branch_starts_nothing() {
        let engine = Orchestrator::new(graph(), context(Arc::new(ScriptedRunner::new())), Default::default());
        let responses = engine
            .push(PushEvent {
                branch: "feature/x".to_string(),
                commit: None,
            })
            .await
            .unwrap();
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_cron_fire_is_skipped() {
        let runner = Arc::new(ScriptedRunner::new().blocking("train"));
        let engine = Orchestrator::new(graph(), context(runner), Default::default());
        let fire = || TriggerEvent::Cron { fired_at: Utc::now() };

        let first = engine.schedule("nightly", fire()).await.unwrap();
        let TriggerOutcome::Started { run_id } = first else {
            panic!("expected started, got {:?}", first);
        };

        let second = engine.schedule("nightly", fire()).await.unwrap();
        assert!(matches!(second, TriggerOutcome::Skipped { kind: None, .. }));

        let cancelled = engine.cancel(run_id).await.unwrap();
        assert_eq!(cancelled.id, run_id);
        let run = wait_for(&engine, run_id).await;
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_queued_run_starts_after_active_finishes() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = Orchestrator::new(graph(), context(runner.clone()), Default::default());

        let first = engine.trigger("main-ci", BTreeMap::new()).await.unwrap();
        let second = engine.trigger("main-ci", BTreeMap::new()).await.unwrap();

        let ids: Vec<Uuid> = [first, second]
            .into_iter()
            .map(|outcome| match outcome {
                TriggerOutcome::Started { run_id } | TriggerOutcome::Queued { run_id, .. } => run_id,
                other => panic!("unexpected outcome {:?}", other),
            })
            .collect();

        for id in &ids {
            assert_eq!(wait_for(&engine, *id).await.status, RunStatus::Succeeded);
        }
        assert_eq!(runner.calls_for("build").len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_queued_run() {
        let runner = Arc::new(ScriptedRunner::new().blocking("build"));
        let engine = Orchestrator::new(graph(), context(runner), Default::default());

        engine.trigger("main-ci", BTreeMap::new()).await.unwrap();
        let TriggerOutcome::Queued { run_id, .. } =
            engine.trigger("main-ci", BTreeMap::new()).await.unwrap()
        else {
            panic!("expected queued run");
        };

        let run = engine.cancel(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(matches!(
            engine.cancel(run_id).await,
            Err(EngineError::InvalidState(_))
        ));
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_pipeline() {
        let engine = Orchestrator::new(graph(), context(Arc::new(ScriptedRunner::new())), Default::default());
        assert!(matches!(
            engine.trigger("missing", BTreeMap::new()).await,
            Err(EngineError::PipelineNotFound(_))
        ));
        assert!(matches!(
            engine.get_run(Uuid::new_v4()).await,
            Err(EngineError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trigger_rejects_invalid_threshold_override() {
        let mut generate = stage("generate", &[], vec![task("engine", "engine")]);
        generate.quality_gate = Some(QualityGateSpec {
            check: QualityCheck::Confidence {
                field: "confidence".to_string(),
            },
            artifact: "recommendations.json".to_string(),
            threshold: None,
            hard_floor: None,
        });
        let graph = PipelineGraph::build(vec![pipeline(
            "recommendation",
            Trigger::Manual,
            &[],
            vec![generate],
        )])
        .unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let engine = Orchestrator::new(graph, context(runner.clone()), Default::default());

        // Default hard floor is 0.5, so 0.4 sits below it
        for bad in ["NaN", "75", "high", "0.4"] {
            let mut overrides = BTreeMap::new();
            overrides.insert(THRESHOLD_VARIABLE.to_string(), bad.to_string());
            let result = engine.trigger("recommendation", overrides).await;
            assert!(
                matches!(result, Err(EngineError::Core(SluiceError::InvalidThreshold { .. }))),
                "{} accepted: {:?}",
                bad,
                result
            );
        }
        assert!(engine.list_runs("recommendation").await.unwrap().is_empty());
        assert!(runner.programs().is_empty());
    }

    #[tokio::test]
    async fn test_downstream_skip_reports_upstream_not_ready() {
        let graph = PipelineGraph::build(vec![
            pipeline(
                "data-collection",
                Trigger::Manual,
                &[],
                vec![stage("collect", &[], vec![task("collect", "collect")])],
            ),
            pipeline(
                "analysis",
                Trigger::UpstreamCompletion {
                    pipeline: "data-collection".to_string(),
                },
                &["data-collection"],
                vec![stage("analyze", &[], vec![task("analyze", "analyze")])],
            ),
        ])
        .unwrap();
        let engine = Orchestrator::new(graph, context(Arc::new(ScriptedRunner::new())), Default::default());

        let outcome = engine
            .schedule(
                "analysis",
                TriggerEvent::UpstreamCompleted {
                    pipeline: "data-collection".to_string(),
                    run_id: Uuid::new_v4(),
                    status: RunStatus::Succeeded,
                },
            )
            .await
            .unwrap();
        match outcome {
            TriggerOutcome::Skipped { reason, kind } => {
                assert_eq!(kind, Some(ErrorKind::UpstreamNotReady));
                assert!(reason.contains("never run"));
            }
            other => panic!("expected skipped, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_latest_completed_run_ignores_active() {
        let runner = Arc::new(ScriptedRunner::new());
        let engine = Orchestrator::new(graph(), context(runner), Default::default());

        let TriggerOutcome::Started { run_id } =
            engine.trigger("main-ci", BTreeMap::new()).await.unwrap()
        else {
            panic!("expected started run");
        };
        wait_for(&engine, run_id).await;

        let run = Run::queued(engine.pipeline("main-ci").unwrap(), RunCause::Manual, BTreeMap::new());
        engine.ctx.repository.insert(&run).await.unwrap();

        assert_eq!(engine.latest_run_status("main-ci").await.unwrap(), Some(RunStatus::Queued));
        let completed = engine.latest_completed_run("main-ci").await.unwrap().unwrap();
        assert_eq!(completed.id, run_id);
        assert_eq!(completed.status, RunStatus::Succeeded);
    }
}
