//! Data-quality gate
//!
//! Scores a stage artifact and compares the score against the gate
//! thresholds. Artifacts are JSON: either an array of records or an object
//! with a `records` array.

use serde_json::Value;
use sluice_core::domain::pipeline::{QualityCheck, QualityGateSpec};
use sluice_core::domain::quality::{QualityIssue, QualityReport, QualityThresholds};
use std::path::Path;

/// Issues kept per report; the rest are summarised
const MAX_ISSUES: usize = 100;

/// Score and findings of one check
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub issues: Vec<QualityIssue>,
}

/// Reads the artifact and produces the gate report
pub async fn validate(
    stage: &str,
    gate: &QualityGateSpec,
    artifact: &Path,
    thresholds: QualityThresholds,
) -> QualityReport {
    let assessment = match tokio::fs::read_to_string(artifact).await {
        Ok(content) => assess(&gate.check, &content),
        Err(e) => Assessment {
            score: 0.0,
            issues: vec![issue(None, None, format!("artifact unreadable: {}", e))],
        },
    };

    QualityReport {
        stage: stage.to_string(),
        artifact: artifact.display().to_string(),
        score: assessment.score,
        thresholds,
        verdict: thresholds.verdict(assessment.score),
        issues: assessment.issues,
    }
}

/// Scores artifact content; structurally invalid content scores 0
pub fn assess(check: &QualityCheck, content: &str) -> Assessment {
    let document: Value = match serde_json::from_str(content) {
        Ok(document) => document,
        Err(e) => {
            return Assessment {
                score: 0.0,
                issues: vec![issue(None, None, format!("artifact is not valid JSON: {}", e))],
            };
        }
    };

    let records = match records(&document) {
        Some(records) => records,
        None => {
            return Assessment {
                score: 0.0,
                issues: vec![issue(
                    None,
                    None,
                    "artifact must be an array of records or an object with a 'records' array",
                )],
            };
        }
    };

    if records.is_empty() {
        return Assessment {
            score: 0.0,
            issues: vec![issue(None, None, "dataset is empty")],
        };
    }

    let mut assessment = match check {
        QualityCheck::Schema { required_fields } => schema(records, required_fields),
        QualityCheck::Confidence { field } => confidence(records, field),
    };
    cap_issues(&mut assessment.issues);
    assessment
}

fn records(document: &Value) -> Option<&Vec<Value>> {
    match document {
        Value::Array(records) => Some(records),
        Value::Object(map) => map.get("records").and_then(Value::as_array),
        _ => None,
    }
}

/// Fraction of records carrying every required field with a usable value
fn schema(records: &[Value], required_fields: &[String]) -> Assessment {
    let mut issues = Vec::new();
    let mut valid = 0usize;

    for (index, record) in records.iter().enumerate() {
        let Some(object) = record.as_object() else {
            issues.push(issue(Some(index), None, "record is not an object"));
            continue;
        };

        let mut complete = true;
        for field in required_fields {
            match object.get(field) {
                None => {
                    complete = false;
                    issues.push(issue(Some(index), Some(field.as_str()), "missing required field"));
                }
                Some(value) if is_null_like(value) => {
                    complete = false;
                    issues.push(issue(Some(index), Some(field.as_str()), "null or NaN value"));
                }
                Some(_) => {}
            }
        }
        if complete {
            valid += 1;
        }
    }

    Assessment {
        score: valid as f64 / records.len() as f64,
        issues,
    }
}

/// Mean of a numeric field; absent or non-numeric values count as zero
fn confidence(records: &[Value], field: &str) -> Assessment {
    let mut issues = Vec::new();
    let mut total = 0.0;

    for (index, record) in records.iter().enumerate() {
        match record.get(field).and_then(Value::as_f64) {
            Some(value) if value.is_finite() => total += value,
            Some(_) | None => {
                issues.push(issue(Some(index), Some(field), "missing or non-numeric value"));
            }
        }
    }

    Assessment {
        score: total / records.len() as f64,
        issues,
    }
}

fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().eq_ignore_ascii_case("nan"),
        _ => false,
    }
}

fn cap_issues(issues: &mut Vec<QualityIssue>) {
    if issues.len() > MAX_ISSUES {
        let omitted = issues.len() - MAX_ISSUES;
        issues.truncate(MAX_ISSUES);
        issues.push(issue(None, None, format!("{} more issues omitted", omitted)));
    }
}

fn issue(record: Option<usize>, field: Option<&str>, message: impl Into<String>) -> QualityIssue {
    QualityIssue {
        record,
        field: field.map(str::to_string),
        message: message.into(),
    }
}
