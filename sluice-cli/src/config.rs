//! CLI configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the orchestrator API
    pub orchestrator_url: String,
    /// Delay between status polls of `run trigger --wait`
    pub wait_interval: Duration,
}

impl Config {
    pub fn new(orchestrator_url: impl Into<String>, wait_interval_secs: u64) -> Self {
        Self {
            orchestrator_url: orchestrator_url.into(),
            wait_interval: Duration::from_secs(wait_interval_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_interval_has_a_floor() {
        let config = Config::new("http://localhost:8080", 0);
        assert_eq!(config.wait_interval, Duration::from_secs(1));
        assert_eq!(Config::new("http://localhost:8080", 3).wait_interval, Duration::from_secs(3));
    }
}
