//! Run executor
//!
//! Resolves the run's secrets, then drives its stage graph: every stage
//! whose dependencies all succeeded is spawned on a `JoinSet`, so
//! independent stages run concurrently. The first failure cancels the
//! remaining stages through a child token.

use chrono::Utc;
use sluice_core::domain::event::{Event, EventKind};
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::{FailureReport, Run, RunStatus, StageStatus};
use sluice_core::error::ErrorKind;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::stage::{StageOutcome, run_stage};
use super::{ExecutionContext, RunScope};
use crate::secrets::SecretError;

/// Executes a queued run to completion and returns its final record
///
/// The run must already be stored in the repository; every status change is
/// written back as it happens.
pub async fn execute_run(
    ctx: &ExecutionContext,
    pipeline: &Pipeline,
    mut run: Run,
    cancel: CancellationToken,
) -> Run {
    if let Err(e) = run.transition(RunStatus::Running) {
        tracing::error!(run_id = %run.id, "Cannot start run: {}", e);
        return run;
    }
    persist(ctx, &run).await;

    tracing::info!(pipeline = %run.pipeline, run_id = %run.id, cause = ?run.cause, "Run started");
    ctx.notifier.emit(Event::new(
        EventKind::RunStarted,
        &run.pipeline,
        Some(run.id),
        "run started",
    ));

    let secrets = match ctx.secrets.resolve(&pipeline.secret_names()).await {
        Ok(secrets) => secrets,
        Err(e) => {
            let message = match &e {
                SecretError::Unavailable(name) => format!("secret '{}' is unavailable", name),
                SecretError::Store(_) => e.to_string(),
            };
            for stage in &mut run.stages {
                stage.status = StageStatus::Cancelled;
            }
            let failure = FailureReport {
                kind: ErrorKind::SecretUnavailable,
                pipeline: run.pipeline.clone(),
                stage: None,
                task: None,
                attempts: 0,
                message,
            };
            return finish(ctx, run, Some(failure), &cancel).await;
        }
    };
    run.secrets = secrets.refs();
    tracing::debug!(run_id = %run.id, secrets = ?secrets, "Secrets resolved");

    let scope = Arc::new(RunScope {
        pipeline: run.pipeline.clone(),
        run_id: run.id,
        variables: run.variables.clone(),
        secrets,
    });

    let stage_cancel = cancel.child_token();
    let mut running: JoinSet<StageOutcome> = JoinSet::new();
    let mut failure: Option<FailureReport> = None;

    loop {
        if failure.is_none() && !stage_cancel.is_cancelled() {
            schedule_ready(ctx, pipeline, &mut run, &scope, &stage_cancel, &mut running);
            persist(ctx, &run).await;
        }

        let Some(joined) = running.join_next().await else {
            break;
        };

        match joined {
            Ok(outcome) => {
                if let Some(report) = outcome.quality {
                    run.quality.push(report);
                }
                if let Some(slot) = run.stage_mut(&outcome.record.name) {
                    *slot = outcome.record;
                }
                if let Some(stage_failure) = outcome.failure {
                    if failure.is_none() {
                        tracing::error!(run_id = %run.id, "{}", stage_failure);
                        failure = Some(stage_failure);
                        stage_cancel.cancel();
                    }
                }
            }
            Err(e) => {
                tracing::error!(run_id = %run.id, "Stage task aborted: {}", e);
                if failure.is_none() {
                    failure = Some(FailureReport {
                        kind: ErrorKind::TerminalTaskFailure,
                        pipeline: run.pipeline.clone(),
                        stage: None,
                        task: None,
                        attempts: 0,
                        message: format!("stage aborted: {}", e),
                    });
                    stage_cancel.cancel();
                }
            }
        }
        persist(ctx, &run).await;
    }

    let now = Utc::now();
    for stage in &mut run.stages {
        match stage.status {
            StageStatus::Pending => {
                stage.status = StageStatus::Cancelled;
                stage.completed_at = Some(now);
            }
            StageStatus::Running => {
                stage.status = StageStatus::Failed;
                stage.completed_at = Some(now);
            }
            _ => {}
        }
    }

    finish(ctx, run, failure, &cancel).await
}

/// Marks or spawns every pending stage whose dependencies are settled
fn schedule_ready(
    ctx: &ExecutionContext,
    pipeline: &Pipeline,
    run: &mut Run,
    scope: &Arc<RunScope>,
    cancel: &CancellationToken,
    running: &mut JoinSet<StageOutcome>,
) {
    loop {
        let mut changed = false;

        for stage in &pipeline.stages {
            if run.stage(&stage.name).map(|s| s.status) != Some(StageStatus::Pending) {
                continue;
            }

            let deps: Vec<StageStatus> = stage
                .depends_on
                .iter()
                .filter_map(|d| run.stage(d).map(|s| s.status))
                .collect();

            let blocked = deps.iter().any(|s| {
                matches!(
                    s,
                    StageStatus::Failed | StageStatus::Skipped | StageStatus::Cancelled
                )
            });
            let ready = deps.iter().all(|s| *s == StageStatus::Succeeded);

            let Some(record) = run.stage_mut(&stage.name) else {
                continue;
            };

            if blocked || (ready && !stage.condition.holds(&scope.variables)) {
                tracing::info!(run_id = %scope.run_id, stage = %stage.name, "Stage skipped");
                record.status = StageStatus::Skipped;
                record.completed_at = Some(Utc::now());
                changed = true;
            } else if ready {
                record.status = StageStatus::Running;
                record.started_at = Some(Utc::now());

                let ctx = ctx.clone();
                let scope = Arc::clone(scope);
                let stage = stage.clone();
                let cancel = cancel.clone();
                running.spawn(async move { run_stage(&ctx, &scope, &stage, &cancel).await });
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
}

async fn finish(
    ctx: &ExecutionContext,
    mut run: Run,
    failure: Option<FailureReport>,
    cancel: &CancellationToken,
) -> Run {
    // A cancel that lands after every stage settled does not undo the run
    let interrupted = run.stages.iter().any(|s| s.status == StageStatus::Cancelled);
    let (status, failure) = match failure {
        Some(failure) => (RunStatus::Failed, Some(failure)),
        None if interrupted => (
            RunStatus::Cancelled,
            Some(FailureReport {
                kind: ErrorKind::Cancelled,
                pipeline: run.pipeline.clone(),
                stage: None,
                task: None,
                attempts: 0,
                message: if cancel.is_cancelled() {
                    "cancelled".to_string()
                } else {
                    "stages were cancelled".to_string()
                },
            }),
        ),
        None => (RunStatus::Succeeded, None),
    };
    run.failure = failure;

    if let Err(e) = run.transition(status) {
        tracing::error!(run_id = %run.id, "Cannot finish run: {}", e);
    }
    persist(ctx, &run).await;

    let elapsed = match (run.started_at, run.completed_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let message = match &run.failure {
        Some(failure) => failure.to_string(),
        None => format!("{} after {:.1}s", run.status, elapsed),
    };

    match run.status {
        RunStatus::Succeeded => {
            tracing::info!(pipeline = %run.pipeline, run_id = %run.id, "Run finished: {}", message)
        }
        _ => {
            tracing::warn!(pipeline = %run.pipeline, run_id = %run.id, "Run finished: {}", message)
        }
    }

    if let Some(kind) = EventKind::for_terminal(run.status) {
        let error = run.failure.as_ref().map(|f| f.kind);
        ctx.notifier
            .emit(Event::new(kind, &run.pipeline, Some(run.id), message).with_error(error));
    }

    run
}

async fn persist(ctx: &ExecutionContext, run: &Run) {
    if let Err(e) = ctx.repository.update(run).await {
        tracing::warn!(run_id = %run.id, "Failed to persist run: {}", e);
    }
}
