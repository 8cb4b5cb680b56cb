//! Run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::run::{Run, RunStatus};

/// Request to trigger a pipeline manually
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRun {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub pipeline: String,
    pub status: RunStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_code: i32,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id,
            pipeline: run.pipeline.clone(),
            status: run.status,
            queued_at: run.queued_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            exit_code: run.exit_code(),
        }
    }
}
