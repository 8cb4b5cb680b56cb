//! Run domain types
//!
//! A run is one execution of a pipeline. It owns its stage and task records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::pipeline::Pipeline;
use crate::domain::quality::QualityReport;
use crate::domain::secret::SecretRef;
use crate::error::{ErrorKind, SluiceError};

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether the status may move to `next`
    ///
    /// Terminal states are final and nothing moves back to `Queued`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, RunStatus::Queued) => false,
            (RunStatus::Running, RunStatus::Running) => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "Queued"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What caused a run to be scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunCause {
    Schedule { fired_at: DateTime<Utc> },
    Push { branch: String, commit: Option<String> },
    Upstream { pipeline: String, run_id: Uuid },
    Manual,
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Succeeded,
    Failed,
    TimedOut,
    CircuitOpen,
    Cancelled,
}

/// Record of one task within a stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub name: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    /// Failure tolerated because the task is best-effort
    pub warning: bool,
}

/// Record of one stage within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskRun>,
    pub warnings: Vec<String>,
}

impl StageRun {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            tasks: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Details of the failure that ended a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub pipeline: String,
    pub stage: Option<String>,
    pub task: Option<String>,
    pub attempts: u32,
    pub message: String,
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} in pipeline '{}'", self.kind, self.pipeline)?;
        if let Some(stage) = &self.stage {
            write!(f, ", stage '{}'", stage)?;
        }
        if let Some(task) = &self.task {
            write!(f, ", task '{}' after {} attempt(s)", task, self.attempts)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// One execution of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline: String,
    pub cause: RunCause,
    pub status: RunStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub variables: BTreeMap<String, String>,
    pub stages: Vec<StageRun>,
    pub secrets: Vec<SecretRef>,
    pub quality: Vec<QualityReport>,
    pub failure: Option<FailureReport>,
}

impl Run {
    /// Creates a queued run for a pipeline, merging variable overrides over defaults
    pub fn queued(
        pipeline: &Pipeline,
        cause: RunCause,
        overrides: BTreeMap<String, String>,
    ) -> Self {
        let mut variables = pipeline.variables.clone();
        variables.extend(overrides);

        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.name.clone(),
            cause,
            status: RunStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            variables,
            stages: pipeline
                .stages
                .iter()
                .map(|s| StageRun::pending(&s.name))
                .collect(),
            secrets: Vec::new(),
            quality: Vec::new(),
            failure: None,
        }
    }

    /// Moves the run to a new status, enforcing monotonicity
    pub fn transition(&mut self, next: RunStatus) -> Result<(), SluiceError> {
        if !self.status.can_transition_to(next) {
            return Err(SluiceError::InvalidTransition {
                run_id: self.id,
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == RunStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    pub fn stage(&self, name: &str) -> Option<&StageRun> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageRun> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Process exit code for CLI wrappers
    ///
    /// 0 = Succeeded, 1 = Failed, 2 = Cancelled, 3 = secret or configuration error.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded => 0,
            RunStatus::Cancelled => 2,
            RunStatus::Failed => match self.failure.as_ref().map(|f| f.kind) {
                Some(ErrorKind::SecretUnavailable) | Some(ErrorKind::Configuration) => 3,
                _ => 1,
            },
            RunStatus::Queued | RunStatus::Running => 1,
        }
    }

    /// Number of tasks that were actually executed at least once
    pub fn executed_task_count(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| s.tasks.iter())
            .filter(|t| t.attempts > 0)
            .count()
    }

    /// Ends a queued or running run from outside its executor.
    ///
    /// Unfinished stages are marked cancelled and the run carries a
    /// `Cancelled` failure report explaining why it was stopped.
    pub fn interrupt(&mut self, reason: impl Into<String>) -> Result<(), SluiceError> {
        self.transition(RunStatus::Cancelled)?;

        let now = self.completed_at;
        for stage in self.stages.iter_mut().filter(|s| !s.status.is_terminal()) {
            stage.status = StageStatus::Cancelled;
            stage.completed_at = now;
        }
        self.failure = Some(FailureReport {
            kind: ErrorKind::Cancelled,
            pipeline: self.pipeline.clone(),
            stage: None,
            task: None,
            attempts: 0,
            message: reason.into(),
        });
        Ok(())
    }
}
