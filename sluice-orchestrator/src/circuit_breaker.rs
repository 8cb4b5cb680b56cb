//! Circuit breaker per external dependency
//!
//! States:
//! - Closed: calls proceed, consecutive failures are counted
//! - Open: calls fail fast until the cooldown elapses
//! - HalfOpen: a single trial call is admitted; its outcome decides
//!   between Closed and Open, and other callers are rejected meanwhile
//!
//! State is shared across runs, so a dependency failing in one pipeline
//! trips the breaker for every pipeline calling it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Circuit breaker tuning
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Circuit state of one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    /// `trial_in_flight` is set while the admitted trial call is unresolved
    HalfOpen { trial_in_flight: bool },
}

/// Rejection returned while a circuit is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpen {
    pub dependency: String,
    pub retry_in: Duration,
}

impl std::fmt::Display for CircuitOpen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "circuit open for '{}', retry in {}s",
            self.dependency,
            self.retry_in.as_secs()
        )
    }
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    states: RwLock<HashMap<String, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Admits a call to `dependency` or rejects it while the circuit is open
    ///
    /// An open circuit whose cooldown elapsed moves to half-open and admits
    /// exactly one trial call. Further callers are rejected until the trial
    /// is recorded or abandoned.
    pub async fn check(&self, dependency: &str) -> Result<(), CircuitOpen> {
        let mut states = self.states.write().await;

        match states.get(dependency).copied() {
            Some(CircuitState::Open { since }) => {
                let elapsed = since.elapsed();
                if elapsed < self.config.cooldown {
                    tracing::debug!(
                        dependency,
                        remaining_ms = (self.config.cooldown - elapsed).as_millis() as u64,
                        "Circuit breaker open"
                    );
                    return Err(CircuitOpen {
                        dependency: dependency.to_string(),
                        retry_in: self.config.cooldown - elapsed,
                    });
                }

                states.insert(
                    dependency.to_string(),
                    CircuitState::HalfOpen {
                        trial_in_flight: true,
                    },
                );
                tracing::info!(dependency, "Circuit breaker entering half-open state");
            }
            Some(CircuitState::HalfOpen {
                trial_in_flight: true,
            }) => {
                tracing::debug!(dependency, "Circuit breaker trial call in flight");
                return Err(CircuitOpen {
                    dependency: dependency.to_string(),
                    retry_in: Duration::ZERO,
                });
            }
            Some(CircuitState::HalfOpen {
                trial_in_flight: false,
            }) => {
                states.insert(
                    dependency.to_string(),
                    CircuitState::HalfOpen {
                        trial_in_flight: true,
                    },
                );
            }
            Some(CircuitState::Closed { .. }) | None => {}
        }

        Ok(())
    }

    /// Releases an admitted call that ended without an outcome
    ///
    /// A cancelled trial call frees the half-open slot for the next caller.
    pub async fn abandon(&self, dependency: &str) {
        let mut states = self.states.write().await;
        if matches!(states.get(dependency), Some(CircuitState::HalfOpen { .. })) {
            states.insert(
                dependency.to_string(),
                CircuitState::HalfOpen {
                    trial_in_flight: false,
                },
            );
        }
    }

    /// Records a successful call, closing the circuit
    pub async fn record_success(&self, dependency: &str) {
        let mut states = self.states.write().await;
        let previous = states.insert(
            dependency.to_string(),
            CircuitState::Closed {
                consecutive_failures: 0,
            },
        );

        if matches!(previous, Some(CircuitState::HalfOpen { .. })) {
            tracing::info!(dependency, "Circuit breaker closed after successful trial");
        }
    }

    /// Records a failed call, opening the circuit at the threshold
    pub async fn record_failure(&self, dependency: &str) {
        let mut states = self.states.write().await;
        let now = Instant::now();

        let next = match states.get(dependency).copied() {
            Some(CircuitState::HalfOpen { .. }) => {
                tracing::warn!(dependency, "Circuit breaker reopened after failed trial");
                CircuitState::Open { since: now }
            }
            Some(CircuitState::Open { since }) => CircuitState::Open { since },
            Some(CircuitState::Closed {
                consecutive_failures,
            }) => self.count_failure(dependency, consecutive_failures + 1, now),
            None => self.count_failure(dependency, 1, now),
        };

        states.insert(dependency.to_string(), next);
    }

    fn count_failure(&self, dependency: &str, failures: u32, now: Instant) -> CircuitState {
        if failures >= self.config.failure_threshold {
            tracing::warn!(dependency, failures, "Circuit breaker opened");
            CircuitState::Open { since: now }
        } else {
            CircuitState::Closed {
                consecutive_failures: failures,
            }
        }
    }

    /// Current state of a dependency's circuit
    #[cfg(test)]
    pub async fn state(&self, dependency: &str) -> CircuitState {
        self.states
            .read()
            .await
            .get(dependency)
            .copied()
            .unwrap_or(CircuitState::Closed {
                consecutive_failures: 0,
            })
    }
}
