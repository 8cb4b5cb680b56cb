//! Run events
//!
//! Events are emitted to notification channels and, for terminal run
//! states, published on the completion bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::RunStatus;
use crate::error::ErrorKind;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    RunSucceeded,
    RunFailed,
    RunCancelled,
    RunSkipped,
    QualityWarning,
    QualityFailure,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RunStarted => "run_started",
            EventKind::RunSucceeded => "run_succeeded",
            EventKind::RunFailed => "run_failed",
            EventKind::RunCancelled => "run_cancelled",
            EventKind::RunSkipped => "run_skipped",
            EventKind::QualityWarning => "quality_warning",
            EventKind::QualityFailure => "quality_failure",
        }
    }

    /// Event emitted when a run reaches the given terminal status
    pub fn for_terminal(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Succeeded => Some(EventKind::RunSucceeded),
            RunStatus::Failed => Some(EventKind::RunFailed),
            RunStatus::Cancelled => Some(EventKind::RunCancelled),
            RunStatus::Queued | RunStatus::Running => None,
        }
    }

    /// Error classification implied by the event itself
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            EventKind::RunCancelled => Some(ErrorKind::Cancelled),
            EventKind::QualityWarning => Some(ErrorKind::DataQualityWarning),
            EventKind::QualityFailure => Some(ErrorKind::DataQualityFailure),
            EventKind::RunStarted
            | EventKind::RunSucceeded
            | EventKind::RunFailed
            | EventKind::RunSkipped => None,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            EventKind::RunStarted | EventKind::RunSucceeded | EventKind::RunSkipped => {
                Severity::Info
            }
            EventKind::RunCancelled | EventKind::QualityWarning => Severity::Warning,
            EventKind::RunFailed | EventKind::QualityFailure => Severity::Error,
        }
    }
}

/// A notification-worthy event about a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub severity: Severity,
    pub pipeline: String,
    pub run_id: Option<Uuid>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        pipeline: impl Into<String>,
        run_id: Option<Uuid>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            pipeline: pipeline.into(),
            run_id,
            message: message.into(),
            error: kind.error_kind(),
            timestamp: Utc::now(),
        }
    }

    /// Overrides the error classification, e.g. with a run's failure kind
    pub fn with_error(mut self, error: Option<ErrorKind>) -> Self {
        if error.is_some() {
            self.error = error;
        }
        self
    }
}

/// Published on the completion bus whenever a run reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub pipeline: String,
    pub run_id: Uuid,
    pub status: RunStatus,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_event_kinds() {
        assert_eq!(
            EventKind::for_terminal(RunStatus::Succeeded),
            Some(EventKind::RunSucceeded)
        );
        assert_eq!(
            EventKind::for_terminal(RunStatus::Failed),
            Some(EventKind::RunFailed)
        );
        assert_eq!(EventKind::for_terminal(RunStatus::Running), None);
    }

    #[test]
    fn test_event_severity() {
        let event = Event::new(EventKind::QualityWarning, "data-collection", None, "low");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.kind.as_str(), "quality_warning");
    }

    #[test]
    fn test_event_error_kinds() {
        let warning = Event::new(EventKind::QualityWarning, "p", None, "low");
        assert_eq!(warning.error, Some(ErrorKind::DataQualityWarning));

        let cancelled = Event::new(EventKind::RunCancelled, "p", None, "stopped");
        assert_eq!(cancelled.error, Some(ErrorKind::Cancelled));

        let failed = Event::new(EventKind::RunFailed, "p", None, "boom")
            .with_error(Some(ErrorKind::UpstreamNotReady));
        assert_eq!(failed.error, Some(ErrorKind::UpstreamNotReady));

        let started = Event::new(EventKind::RunStarted, "p", None, "go").with_error(None);
        assert_eq!(started.error, None);
        let json = serde_json::to_value(&started).unwrap();
        assert!(json.get("error").is_none());
    }
}
