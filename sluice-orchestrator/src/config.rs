//! Orchestrator configuration
//!
//! Every numeric default of the engine (backoff caps aside, which live on the
//! task retry policy) can be tuned from the environment.

use std::path::PathBuf;
use std::time::Duration;

use sluice_core::domain::quality::DEFAULT_HARD_FLOOR;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Directory holding one `*.lua` definition per pipeline
    pub pipelines_dir: PathBuf,

    /// Postgres URL for the run log; in-memory when unset
    pub database_url: Option<String>,

    /// How often cron triggers are evaluated
    pub poll_interval: Duration,

    /// Timeout for tasks that do not declare their own
    pub task_timeout: Duration,

    /// Maximum number of pending push/manual runs per pipeline
    pub push_queue_depth: usize,

    /// Consecutive failures that open a dependency's circuit
    pub breaker_threshold: u32,

    /// How long an open circuit fails calls fast
    pub breaker_cooldown: Duration,

    /// Quality score below which a run fails outright
    pub hard_floor: f64,

    /// Optional JSON file of secret values
    pub secrets_file: Option<PathBuf>,

    /// Optional chat webhook receiving notifications
    pub webhook_url: Option<String>,

    /// Bytes of stdout/stderr kept per task attempt
    pub output_limit: usize,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SLUICE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SLUICE_PIPELINES_DIR (default: ./pipelines)
    /// - DATABASE_URL (default: in-memory run log)
    /// - SLUICE_POLL_INTERVAL (seconds, default: 30)
    /// - SLUICE_TASK_TIMEOUT (seconds, default: 3600)
    /// - SLUICE_PUSH_QUEUE_DEPTH (default: 10)
    /// - SLUICE_BREAKER_THRESHOLD (default: 5)
    /// - SLUICE_BREAKER_COOLDOWN (seconds, default: 300)
    /// - SLUICE_HARD_FLOOR (default: 0.5)
    /// - SLUICE_SECRETS_FILE
    /// - SLUICE_WEBHOOK_URL
    /// - SLUICE_OUTPUT_LIMIT (bytes, default: 65536)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads and validates the environment; any malformed value is an error
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).map(|raw| (key.to_string(), raw));

        Ok(Self {
            bind_addr: lookup("SLUICE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            pipelines_dir: lookup("SLUICE_PIPELINES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.pipelines_dir),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            poll_interval: parse_value::<u64>(parse("SLUICE_POLL_INTERVAL"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            task_timeout: parse_value::<u64>(parse("SLUICE_TASK_TIMEOUT"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            push_queue_depth: parse_value(parse("SLUICE_PUSH_QUEUE_DEPTH"))?
                .unwrap_or(defaults.push_queue_depth),
            breaker_threshold: parse_value(parse("SLUICE_BREAKER_THRESHOLD"))?
                .unwrap_or(defaults.breaker_threshold),
            breaker_cooldown: parse_value::<u64>(parse("SLUICE_BREAKER_COOLDOWN"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker_cooldown),
            hard_floor: parse_value(parse("SLUICE_HARD_FLOOR"))?.unwrap_or(defaults.hard_floor),
            secrets_file: lookup("SLUICE_SECRETS_FILE").map(PathBuf::from),
            webhook_url: lookup("SLUICE_WEBHOOK_URL").filter(|s| !s.is_empty()),
            output_limit: parse_value(parse("SLUICE_OUTPUT_LIMIT"))?
                .unwrap_or(defaults.output_limit),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.task_timeout.as_secs() == 0 {
            anyhow::bail!("task_timeout must be greater than 0");
        }

        if self.push_queue_depth == 0 {
            anyhow::bail!("push_queue_depth must be greater than 0");
        }

        if self.breaker_threshold == 0 {
            anyhow::bail!("breaker_threshold must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.hard_floor) {
            anyhow::bail!("hard_floor must be between 0 and 1");
        }

        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("webhook_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            pipelines_dir: PathBuf::from("pipelines"),
            database_url: None,
            poll_interval: Duration::from_secs(30),
            task_timeout: Duration::from_secs(3600),
            push_queue_depth: 10,
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(300),
            hard_floor: DEFAULT_HARD_FLOOR,
            secrets_file: None,
            webhook_url: None,
            output_limit: 64 * 1024,
        }
    }
}

/// Parses an optional `(key, raw)` pair, rejecting malformed values
fn parse_value<T: std::str::FromStr>(entry: Option<(String, String)>) -> anyhow::Result<Option<T>> {
    match entry {
        Some((key, raw)) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.push_queue_depth, 10);
        assert_eq!(config.hard_floor, 0.5);
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.push_queue_depth = 0;
        assert!(config.validate().is_err());
        config.push_queue_depth = 1;

        config.hard_floor = 1.5;
        assert!(config.validate().is_err());
        config.hard_floor = 0.4;

        config.webhook_url = Some("chat.example.com/hook".to_string());
        assert!(config.validate().is_err());

        config.webhook_url = Some("https://chat.example.com/hook".to_string());
        assert!(config.validate().is_ok());
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SLUICE_POLL_INTERVAL", "5"),
            ("SLUICE_HARD_FLOOR", " 0.3 "),
            ("DATABASE_URL", ""),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.hard_floor, 0.3);
        assert!(config.database_url.is_none());
        assert_eq!(config.push_queue_depth, 10);
    }

    #[test]
    fn test_malformed_variable_is_an_error() {
        let err = Config::from_lookup(lookup(&[
            ("SLUICE_BIND_ADDR", "127.0.0.1:9000"),
            ("SLUICE_TASK_TIMEOUT", "an hour"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SLUICE_TASK_TIMEOUT"));

        let config = Config::from_lookup(lookup(&[("SLUICE_HARD_FLOOR", "NaN")])).unwrap();
        assert!(config.validate().is_err());
    }
}
