//! Error taxonomy shared across Sluice crates

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::run::RunStatus;

/// Failure classes used in run failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Task failed but will be retried
    TransientTaskFailure,
    /// Task failed after its retries were exhausted
    TerminalTaskFailure,
    SecretUnavailable,
    DataQualityWarning,
    DataQualityFailure,
    UpstreamNotReady,
    CircuitOpen,
    Timeout,
    Cancelled,
    Configuration,
}

/// Errors raised by core operations
#[derive(Debug, Error)]
pub enum SluiceError {
    #[error("run {run_id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("pipeline '{0}' is defined more than once")]
    DuplicatePipeline(String),

    #[error("pipeline '{pipeline}' depends on unknown pipeline '{upstream}'")]
    UnknownUpstream { pipeline: String, upstream: String },

    #[error("pipeline dependency cycle involving: {0}")]
    PipelineCycle(String),

    #[error("pipeline '{pipeline}': {message}")]
    InvalidStages { pipeline: String, message: String },

    #[error("pipeline '{pipeline}': invalid trigger: {message}")]
    InvalidTrigger { pipeline: String, message: String },

    #[error("invalid quality threshold '{value}': {message}")]
    InvalidThreshold { value: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Errors raised while expanding `$(name)` references
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unterminated variable reference in '{0}'")]
    Unterminated(String),
}
