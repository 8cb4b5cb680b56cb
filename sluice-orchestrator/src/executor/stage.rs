//! Stage executor
//!
//! Tasks run strictly in order. A failed task aborts the stage unless it is
//! best-effort, in which case the failure is kept as a warning. Each task
//! is retried with exponential backoff and guarded by the circuit breaker
//! of its external dependency.

use chrono::Utc;
use sluice_core::domain::event::{Event, EventKind};
use sluice_core::domain::pipeline::{Stage, Task};
use sluice_core::domain::quality::{QualityReport, QualityVerdict};
use sluice_core::domain::run::{FailureReport, StageRun, StageStatus, TaskRun, TaskStatus};
use sluice_core::error::{ErrorKind, TemplateError};
use sluice_core::template::render;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ExecutionContext, RunScope};
use crate::quality;
use crate::runner::{TaskInvocation, TaskResult, Termination};

/// Result of running one stage
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub record: StageRun,
    pub failure: Option<FailureReport>,
    pub quality: Option<QualityReport>,
}

/// Why a task did not succeed
struct TaskFailure {
    kind: ErrorKind,
    message: String,
}

/// Runs every task of `stage`, then its quality gate
pub async fn run_stage(
    ctx: &ExecutionContext,
    scope: &RunScope,
    stage: &Stage,
    cancel: &CancellationToken,
) -> StageOutcome {
    let mut outcome = StageOutcome {
        record: StageRun {
            status: StageStatus::Running,
            started_at: Some(Utc::now()),
            ..StageRun::pending(&stage.name)
        },
        failure: None,
        quality: None,
    };

    tracing::info!(pipeline = %scope.pipeline, stage = %stage.name, "Stage started");

    for task in &stage.tasks {
        if cancel.is_cancelled() {
            return finish(outcome, StageStatus::Cancelled);
        }

        let (record, failure) = run_task(ctx, scope, task, cancel).await;
        let attempts = record.attempts;
        let status = record.status;
        outcome.record.tasks.push(record);

        match (status, failure) {
            (TaskStatus::Succeeded, _) => {}
            (TaskStatus::Cancelled, _) => return finish(outcome, StageStatus::Cancelled),
            (_, Some(failure)) if task.best_effort => {
                let warning = format!("best-effort task '{}' failed: {}", task.name, failure.message);
                tracing::warn!(pipeline = %scope.pipeline, stage = %stage.name, "{}", warning);
                if let Some(last) = outcome.record.tasks.last_mut() {
                    last.warning = true;
                }
                outcome.record.warnings.push(warning);
            }
            (_, failure) => {
                let failure = failure.unwrap_or(TaskFailure {
                    kind: ErrorKind::TerminalTaskFailure,
                    message: "task failed".to_string(),
                });
                outcome.failure = Some(FailureReport {
                    kind: failure.kind,
                    pipeline: scope.pipeline.clone(),
                    stage: Some(stage.name.clone()),
                    task: Some(task.name.clone()),
                    attempts,
                    message: failure.message,
                });
                return finish(outcome, StageStatus::Failed);
            }
        }
    }

    if let Some(gate) = &stage.quality_gate {
        if cancel.is_cancelled() {
            return finish(outcome, StageStatus::Cancelled);
        }

        let artifact = match render(&gate.artifact, &(&scope.variables, &scope.secrets)) {
            Ok(path) => PathBuf::from(path),
            Err(e) => {
                outcome.failure = Some(configuration_failure(scope, stage, None, &e));
                return finish(outcome, StageStatus::Failed);
            }
        };

        let thresholds = match gate.thresholds(&scope.variables, ctx.settings.hard_floor) {
            Ok(thresholds) => thresholds,
            Err(e) => {
                outcome.failure = Some(configuration_failure(scope, stage, None, &e));
                return finish(outcome, StageStatus::Failed);
            }
        };
        let report = quality::validate(&stage.name, gate, &artifact, thresholds).await;

        let summary = format!(
            "stage '{}' quality score {:.3} (threshold {:.2}, floor {:.2}, {} issue(s))",
            stage.name,
            report.score,
            thresholds.threshold,
            thresholds.hard_floor,
            report.issues.len()
        );

        match report.verdict {
            QualityVerdict::Pass => {
                tracing::info!(pipeline = %scope.pipeline, "{}", summary);
            }
            QualityVerdict::Warning => {
                tracing::warn!(pipeline = %scope.pipeline, "{}", summary);
                ctx.notifier.emit(
                    Event::new(
                        EventKind::QualityWarning,
                        &scope.pipeline,
                        Some(scope.run_id),
                        &summary,
                    )
                    .with_error(report.verdict.error_kind()),
                );
                outcome.record.warnings.push(summary);
            }
            QualityVerdict::Fail => {
                tracing::error!(pipeline = %scope.pipeline, "{}", summary);
                ctx.notifier.emit(Event::new(
                    EventKind::QualityFailure,
                    &scope.pipeline,
                    Some(scope.run_id),
                    &summary,
                ));
                outcome.failure = Some(FailureReport {
                    kind: report.verdict.error_kind().unwrap_or(ErrorKind::DataQualityFailure),
                    pipeline: scope.pipeline.clone(),
                    stage: Some(stage.name.clone()),
                    task: None,
                    attempts: 0,
                    message: summary,
                });
                outcome.quality = Some(report);
                return finish(outcome, StageStatus::Failed);
            }
        }
        outcome.quality = Some(report);
    }

    finish(outcome, StageStatus::Succeeded)
}

fn finish(mut outcome: StageOutcome, status: StageStatus) -> StageOutcome {
    outcome.record.status = status;
    outcome.record.completed_at = Some(Utc::now());
    tracing::info!(stage = %outcome.record.name, status = ?status, "Stage finished");
    outcome
}

fn configuration_failure(
    scope: &RunScope,
    stage: &Stage,
    task: Option<&Task>,
    error: &impl std::fmt::Display,
) -> FailureReport {
    FailureReport {
        kind: ErrorKind::Configuration,
        pipeline: scope.pipeline.clone(),
        stage: Some(stage.name.clone()),
        task: task.map(|t| t.name.clone()),
        attempts: 0,
        message: error.to_string(),
    }
}

/// Expands templates of a task into a concrete invocation
fn render_invocation(
    task: &Task,
    scope: &RunScope,
    default_timeout: Duration,
) -> Result<TaskInvocation, TemplateError> {
    let vars = (&scope.variables, &scope.secrets);

    let args = task
        .args
        .iter()
        .map(|arg| render(arg, &vars))
        .collect::<Result<Vec<_>, _>>()?;

    let env: BTreeMap<String, String> = task
        .env
        .iter()
        .map(|(key, value)| Ok::<_, TemplateError>((key.clone(), render(value, &vars)?)))
        .collect::<Result<_, _>>()?;

    let working_dir = task
        .working_dir
        .as_deref()
        .map(|dir| render(dir, &vars).map(PathBuf::from))
        .transpose()?;

    Ok(TaskInvocation {
        program: render(&task.command, &vars)?,
        args,
        env,
        secret_env: scope.secrets.env_for(&task.secrets),
        working_dir,
        timeout: task
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(default_timeout),
    })
}

/// Runs one task with retries, returning its record and failure if any
async fn run_task(
    ctx: &ExecutionContext,
    scope: &RunScope,
    task: &Task,
    cancel: &CancellationToken,
) -> (TaskRun, Option<TaskFailure>) {
    let mut record = TaskRun {
        name: task.name.clone(),
        status: TaskStatus::Failed,
        attempts: 0,
        exit_code: None,
        duration_ms: 0,
        stdout: String::new(),
        stderr: String::new(),
        error: None,
        warning: false,
    };

    let invocation = match render_invocation(task, scope, ctx.settings.default_timeout) {
        Ok(invocation) => invocation,
        Err(e) => {
            record.error = Some(e.to_string());
            let failure = TaskFailure {
                kind: ErrorKind::Configuration,
                message: e.to_string(),
            };
            return (record, Some(failure));
        }
    };

    let dependency = task.dependency_key().to_string();
    let max_attempts = task.retry.max_attempts.max(1);

    let failure = loop {
        if cancel.is_cancelled() {
            record.status = TaskStatus::Cancelled;
            break None;
        }

        if let Err(open) = ctx.breaker.check(&dependency).await {
            tracing::warn!(task = %task.name, "{}", open);
            record.status = TaskStatus::CircuitOpen;
            record.error = Some(open.to_string());
            break Some(TaskFailure {
                kind: ErrorKind::CircuitOpen,
                message: open.to_string(),
            });
        }

        record.attempts += 1;
        tracing::debug!(
            task = %task.name,
            attempt = record.attempts,
            max_attempts,
            "Executing task"
        );

        let result = ctx.runner.execute(&invocation, cancel).await;
        apply_result(&mut record, &result, scope);

        match result.termination {
            Termination::Exited(0) => {
                ctx.breaker.record_success(&dependency).await;
                record.status = TaskStatus::Succeeded;
                record.error = None;
                break None;
            }
            Termination::Cancelled => {
                ctx.breaker.abandon(&dependency).await;
                record.status = TaskStatus::Cancelled;
                break None;
            }
            ref termination => {
                ctx.breaker.record_failure(&dependency).await;
                let message = result.describe();
                record.error = Some(message.clone());

                if record.attempts >= max_attempts {
                    let (status, kind) = if *termination == Termination::TimedOut {
                        (TaskStatus::TimedOut, ErrorKind::Timeout)
                    } else {
                        (TaskStatus::Failed, ErrorKind::TerminalTaskFailure)
                    };
                    record.status = status;
                    tracing::error!(
                        task = %task.name,
                        attempts = record.attempts,
                        "Task failed: {}",
                        message
                    );
                    break Some(TaskFailure { kind, message });
                }

                let delay = task.retry.delay_for(record.attempts - 1);
                tracing::warn!(
                    task = %task.name,
                    attempt = record.attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    kind = ?ErrorKind::TransientTaskFailure,
                    "Task attempt failed: {}, retrying",
                    message
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        record.status = TaskStatus::Cancelled;
                        break None;
                    }
                }
            }
        }
    };

    (record, failure)
}

fn apply_result(record: &mut TaskRun, result: &TaskResult, scope: &RunScope) {
    record.exit_code = result.exit_code();
    record.duration_ms += result.duration.as_millis() as u64;
    record.stdout = scope.secrets.scrub(&result.stdout);
    record.stderr = scope.secrets.scrub(&result.stderr);
}
