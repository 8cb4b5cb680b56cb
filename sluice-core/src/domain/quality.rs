//! Data-quality report types

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SluiceError};

/// Run variable overriding the default soft threshold
pub const THRESHOLD_VARIABLE: &str = "confidenceThreshold";

/// Default soft threshold when neither the gate nor the run variables set one
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Default hard floor below which data counts as structurally invalid
pub const DEFAULT_HARD_FLOOR: f64 = 0.5;

/// Outcome of comparing a score against the gate thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityVerdict {
    Pass,
    Warning,
    Fail,
}

impl QualityVerdict {
    /// Error class reported for a verdict short of `Pass`
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            QualityVerdict::Pass => None,
            QualityVerdict::Warning => Some(ErrorKind::DataQualityWarning),
            QualityVerdict::Fail => Some(ErrorKind::DataQualityFailure),
        }
    }
}

/// Soft threshold and hard floor of a gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub threshold: f64,
    pub hard_floor: f64,
}

impl QualityThresholds {
    /// Builds thresholds within [0, 1] whose floor does not exceed the threshold
    pub fn new(threshold: f64, hard_floor: f64) -> Result<Self, SluiceError> {
        let threshold = check_bounds("threshold", threshold)?;
        let hard_floor = check_bounds("hard floor", hard_floor)?;
        if hard_floor > threshold {
            return Err(SluiceError::InvalidThreshold {
                value: threshold.to_string(),
                message: format!("below the hard floor {}", hard_floor),
            });
        }

        Ok(Self {
            threshold,
            hard_floor,
        })
    }

    /// `score >= threshold` passes, `score >= hard_floor` warns, anything lower fails
    pub fn verdict(&self, score: f64) -> QualityVerdict {
        if score.is_nan() || score < self.hard_floor {
            QualityVerdict::Fail
        } else if score < self.threshold {
            QualityVerdict::Warning
        } else {
            QualityVerdict::Pass
        }
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            hard_floor: DEFAULT_HARD_FLOOR,
        }
    }
}

/// Parses a threshold given as a run variable
pub fn parse_threshold(raw: &str) -> Result<f64, SluiceError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| SluiceError::InvalidThreshold {
            value: raw.to_string(),
            message: "not a number".to_string(),
        })?;
    check_bounds("threshold", value)
}

fn check_bounds(what: &str, value: f64) -> Result<f64, SluiceError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SluiceError::InvalidThreshold {
            value: value.to_string(),
            message: format!("{} must be between 0 and 1", what),
        })
    }
}

/// Single finding of a quality check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Record index the issue refers to, if any
    pub record: Option<usize>,
    pub field: Option<String>,
    pub message: String,
}

/// Result of validating an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub stage: String,
    pub artifact: String,
    pub score: f64,
    pub thresholds: QualityThresholds,
    pub verdict: QualityVerdict,
    pub issues: Vec<QualityIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_boundaries() {
        let t = QualityThresholds {
            threshold: 0.75,
            hard_floor: 0.5,
        };
        assert_eq!(t.verdict(0.75), QualityVerdict::Pass);
        assert_eq!(t.verdict(0.75 - f64::EPSILON), QualityVerdict::Warning);
        assert_eq!(t.verdict(0.5), QualityVerdict::Warning);
        assert_eq!(t.verdict(0.49), QualityVerdict::Fail);
        assert_eq!(t.verdict(f64::NAN), QualityVerdict::Fail);
        assert_eq!(t.verdict(1.0), QualityVerdict::Pass);
    }

    #[test]
    fn test_thresholds_are_range_checked() {
        assert!(QualityThresholds::new(0.75, 0.5).is_ok());
        assert!(QualityThresholds::new(0.5, 0.5).is_ok());
        assert!(QualityThresholds::new(75.0, 0.5).is_err());
        assert!(QualityThresholds::new(f64::NAN, 0.5).is_err());
        assert!(QualityThresholds::new(0.75, -0.1).is_err());
        assert!(matches!(
            QualityThresholds::new(0.4, 0.5),
            Err(SluiceError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold(" 0.8 ").unwrap(), 0.8);
        assert_eq!(parse_threshold("1").unwrap(), 1.0);
        for raw in ["NaN", "inf", "75", "-0.2", "high", ""] {
            assert!(
                matches!(parse_threshold(raw), Err(SluiceError::InvalidThreshold { .. })),
                "{} accepted",
                raw
            );
        }
    }

    #[test]
    fn test_verdict_error_kinds() {
        assert_eq!(QualityVerdict::Pass.error_kind(), None);
        assert_eq!(
            QualityVerdict::Warning.error_kind(),
            Some(ErrorKind::DataQualityWarning)
        );
        assert_eq!(
            QualityVerdict::Fail.error_kind(),
            Some(ErrorKind::DataQualityFailure)
        );
    }
}
