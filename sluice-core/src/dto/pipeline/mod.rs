//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, Trigger};
use crate::domain::run::RunStatus;

/// Pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub upstream: Vec<String>,
    pub stage_count: usize,
    pub latest_status: Option<RunStatus>,
}

impl PipelineSummary {
    pub fn new(pipeline: &Pipeline, upstream: Vec<String>, latest_status: Option<RunStatus>) -> Self {
        Self {
            name: pipeline.name.clone(),
            description: pipeline.description.clone(),
            trigger: pipeline.trigger.clone(),
            upstream,
            stage_count: pipeline.stages.len(),
            latest_status,
        }
    }
}

/// Answer to `latest_run_status(pipeline)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub pipeline: String,
    pub run_id: Option<Uuid>,
    pub status: Option<RunStatus>,
    /// Most recent run that reached a terminal status
    #[serde(default)]
    pub last_completed: Option<CompletedRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub completed_at: Option<DateTime<Utc>>,
}
