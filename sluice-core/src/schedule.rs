//! Cron expression handling
//!
//! Expressions use the `cron` crate syntax (seconds first). Classic
//! five-field expressions are accepted and run at second zero.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::error::SluiceError;

/// Parses a cron expression, accepting 5, 6 or 7 fields
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {}", trimmed))
    } else {
        Schedule::from_str(trimmed)
    }
}

/// Validates the cron expression of a pipeline trigger
pub fn validate_cron(pipeline: &str, expr: &str) -> Result<Schedule, SluiceError> {
    parse_cron(expr).map_err(|e| SluiceError::InvalidTrigger {
        pipeline: pipeline.to_string(),
        message: format!("invalid cron expression '{}': {}", expr, e),
    })
}

/// Latest cron boundary in `(after, until]`, if any
pub fn last_boundary(
    schedule: &Schedule,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&after)
        .take_while(|t| *t <= until)
        .last()
}
