//! Job scheduler
//!
//! Decides whether a trigger event concerns a pipeline and whether the
//! pipeline's upstreams allow it to start. Admission (one active run per
//! pipeline, the push queue) lives in the engine.

use chrono::{DateTime, Utc};
use cron::Schedule;
use sluice_core::domain::pipeline::{Pipeline, Trigger};
use sluice_core::domain::run::{RunCause, RunStatus};
use sluice_core::graph::PipelineGraph;
use sluice_core::schedule::{last_boundary, parse_cron};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::repository::{RepositoryError, RunRepository};

/// Something that may cause a run
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    Cron {
        fired_at: DateTime<Utc>,
    },
    Push {
        branch: String,
        commit: Option<String>,
    },
    UpstreamCompleted {
        pipeline: String,
        run_id: Uuid,
        status: RunStatus,
    },
    Manual {
        variables: BTreeMap<String, String>,
    },
}

/// Maps an event to a run cause if it matches the pipeline's trigger
///
/// Manual events match every pipeline. Upstream completions only match when
/// the upstream run succeeded.
pub fn resolve_cause(pipeline: &Pipeline, event: &TriggerEvent) -> Option<RunCause> {
    match (&pipeline.trigger, event) {
        (_, TriggerEvent::Manual { .. }) => Some(RunCause::Manual),
        (Trigger::Scheduled { .. }, TriggerEvent::Cron { fired_at }) => Some(RunCause::Schedule {
            fired_at: *fired_at,
        }),
        (Trigger::BranchPush { branch }, TriggerEvent::Push { branch: pushed, commit })
            if branch == pushed =>
        {
            Some(RunCause::Push {
                branch: pushed.clone(),
                commit: commit.clone(),
            })
        }
        (
            Trigger::UpstreamCompletion { pipeline: upstream },
            TriggerEvent::UpstreamCompleted {
                pipeline: completed,
                run_id,
                status,
            },
        ) if upstream == completed && *status == RunStatus::Succeeded => Some(RunCause::Upstream {
            pipeline: completed.clone(),
            run_id: *run_id,
        }),
        _ => None,
    }
}

/// Whether a pipeline's upstreams allow it to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// An upstream's latest run is missing or not `Succeeded`
    NotReady {
        upstream: String,
        status: Option<RunStatus>,
    },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::NotReady {
                upstream,
                status: Some(status),
            } => write!(f, "upstream '{}' latest run is {}", upstream, status),
            Readiness::NotReady {
                upstream,
                status: None,
            } => write!(f, "upstream '{}' has never run", upstream),
        }
    }
}

/// Checks that the latest run of every upstream succeeded
///
/// The latest run is the most recently queued one, so a newer run of an
/// upstream that is still queued or running blocks the pipeline.
pub async fn can_start(
    graph: &PipelineGraph,
    repository: &dyn RunRepository,
    pipeline: &str,
) -> Result<Readiness, RepositoryError> {
    for upstream in graph.upstream_of(pipeline) {
        let status = repository.latest(upstream).await?.map(|run| run.status);
        if status != Some(RunStatus::Succeeded) {
            return Ok(Readiness::NotReady {
                upstream: upstream.clone(),
                status,
            });
        }
    }
    Ok(Readiness::Ready)
}

/// Tracks cron boundaries of scheduled pipelines between polls
pub struct CronTicker {
    schedules: Vec<(String, Schedule)>,
    last_tick: DateTime<Utc>,
}

impl CronTicker {
    /// Collects the schedules of every `Scheduled` pipeline in the graph
    pub fn new(graph: &PipelineGraph, start: DateTime<Utc>) -> Self {
        let schedules = graph
            .pipelines()
            .filter_map(|p| match &p.trigger {
                Trigger::Scheduled { cron } => match parse_cron(cron) {
                    Ok(schedule) => Some((p.name.clone(), schedule)),
                    Err(e) => {
                        tracing::error!(pipeline = %p.name, "Invalid cron expression: {}", e);
                        None
                    }
                },
                _ => None,
            })
            .collect();

        Self {
            schedules,
            last_tick: start,
        }
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// Pipelines with a boundary since the previous call, with that boundary
    ///
    /// Several missed boundaries of one pipeline collapse into the latest.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<(String, DateTime<Utc>)> {
        if now <= self.last_tick {
            return Vec::new();
        }

        let due = self
            .schedules
            .iter()
            .filter_map(|(name, schedule)| {
                last_boundary(schedule, self.last_tick, now).map(|at| (name.clone(), at))
            })
            .collect();
        self.last_tick = now;
        due
    }
}
