//! Trigger event DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// Branch push notification from a source host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub branch: String,
    #[serde(default)]
    pub commit: Option<String>,
}

/// What the scheduler did with a trigger event for one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started { run_id: Uuid },
    Queued { run_id: Uuid, depth: usize },
    Skipped {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
    },
}

impl TriggerOutcome {
    pub fn skipped(reason: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        TriggerOutcome::Skipped {
            reason: reason.into(),
            kind,
        }
    }
}

/// Per-pipeline result of a trigger request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub pipeline: String,
    #[serde(flatten)]
    pub outcome: TriggerOutcome,
}
