//! Pipeline domain types
//!
//! A pipeline is loaded once from its definition file and never mutated
//! afterwards. Runs reference pipelines by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::quality::{
    DEFAULT_CONFIDENCE_THRESHOLD, QualityThresholds, THRESHOLD_VARIABLE, parse_threshold,
};
use crate::error::SluiceError;

/// Pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    /// Pipelines whose latest run must have succeeded before this one starts
    #[serde(default)]
    pub upstream: Vec<String>,
    /// Default run variables, overridable per run
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Looks up a stage by name
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// All secret names referenced by any task, deduplicated, in declaration order
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for task in self.stages.iter().flat_map(|s| s.tasks.iter()) {
            for secret in &task.secrets {
                if !names.contains(secret) {
                    names.push(secret.clone());
                }
            }
        }
        names
    }
}

/// Event class that causes a run to be scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Scheduled { cron: String },
    BranchPush { branch: String },
    UpstreamCompletion { pipeline: String },
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Scheduled { cron } => write!(f, "schedule({})", cron),
            Trigger::BranchPush { branch } => write!(f, "push({})", branch),
            Trigger::UpstreamCompletion { pipeline } => write!(f, "after({})", pipeline),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Ordered group of tasks with intra-pipeline dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub condition: RunCondition,
    pub tasks: Vec<Task>,
    /// Quality gate evaluated after all tasks of the stage finished
    #[serde(default)]
    pub quality_gate: Option<QualityGateSpec>,
}

/// Condition evaluated once all `depends_on` stages succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunCondition {
    #[default]
    Always,
    VariableEquals { variable: String, value: String },
}

impl RunCondition {
    /// Evaluates the condition against the run variables
    pub fn holds(&self, variables: &BTreeMap<String, String>) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::VariableEquals { variable, value } => {
                variables.get(variable).is_some_and(|v| v == value)
            }
        }
    }
}

/// One external command execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    /// Program to run, may contain `$(var)` references
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment entries, values may contain `$(var)` references
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Secret names injected into the task environment
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Identity of the external dependency this task calls (circuit breaker key)
    #[serde(default)]
    pub dependency: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl Task {
    /// Circuit breaker key, falling back to the command name
    pub fn dependency_key(&self) -> &str {
        self.dependency.as_deref().unwrap_or(&self.command)
    }
}

/// Retry policy for a task
///
/// The delay before retry `n` (0-based) is `base_delay_ms * 2^n`, capped at
/// `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy that runs the task exactly once
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff delay before retry number `retry` (0 for the first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

/// Kind of check a quality gate performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityCheck {
    /// Every record must carry these fields with non-null values
    Schema { required_fields: Vec<String> },
    /// Mean of a numeric field across records
    Confidence { field: String },
}

/// Quality gate attached to a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateSpec {
    pub check: QualityCheck,
    /// Path template of the artifact produced by the stage
    pub artifact: String,
    /// Soft threshold; falls back to the `confidenceThreshold` variable
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Hard floor; falls back to the orchestrator default
    #[serde(default)]
    pub hard_floor: Option<f64>,
}

impl QualityGateSpec {
    /// Effective thresholds of the gate for a run
    ///
    /// The gate's own threshold wins, then the `confidenceThreshold` variable,
    /// then 0.75. The hard floor comes from the gate or `default_floor`.
    pub fn thresholds(
        &self,
        variables: &BTreeMap<String, String>,
        default_floor: f64,
    ) -> Result<QualityThresholds, SluiceError> {
        let threshold = match (self.threshold, variables.get(THRESHOLD_VARIABLE)) {
            (Some(threshold), _) => threshold,
            (None, Some(raw)) => parse_threshold(raw)?,
            (None, None) => DEFAULT_CONFIDENCE_THRESHOLD,
        };
        QualityThresholds::new(threshold, self.hard_floor.unwrap_or(default_floor))
    }
}
