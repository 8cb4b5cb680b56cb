//! Run execution
//!
//! `run` drives a whole run: secret resolution, then the stage graph on a
//! `JoinSet`. `stage` runs the tasks of one stage in order with retries, the
//! circuit breaker and the optional quality gate.

pub mod run;
pub mod stage;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use sluice_core::domain::quality::DEFAULT_HARD_FLOOR;

use crate::circuit_breaker::CircuitBreaker;
use crate::notifier::Notifier;
use crate::repository::RunRepository;
use crate::runner::TaskRunner;
use crate::secrets::{SecretProvider, SecretSet};

pub use run::execute_run;
pub use stage::{StageOutcome, run_stage};

/// Tunables applied while executing runs
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    /// Timeout for tasks without their own `timeout_seconds`
    pub default_timeout: Duration,
    /// Hard floor for quality gates without their own
    pub hard_floor: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(3600),
            hard_floor: DEFAULT_HARD_FLOOR,
        }
    }
}

/// Collaborators shared by every run
#[derive(Clone)]
pub struct ExecutionContext {
    pub runner: Arc<dyn TaskRunner>,
    pub breaker: Arc<CircuitBreaker>,
    pub secrets: Arc<dyn SecretProvider>,
    pub repository: Arc<dyn RunRepository>,
    pub notifier: Notifier,
    pub settings: ExecutionSettings,
}

/// Read-only data of one run, shared by its stages
#[derive(Debug)]
pub struct RunScope {
    pub pipeline: String,
    pub run_id: Uuid,
    pub variables: BTreeMap<String, String>,
    pub secrets: SecretSet,
}
