//! Secret providers
//!
//! Secrets are resolved once per run, before any task executes. A missing
//! secret fails the run; there is never a fallback value.

mod env;
mod file;

use async_trait::async_trait;
use sluice_core::domain::secret::{REDACTED, SecretRef};
use sluice_core::template::VarSource;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

pub use env::{EnvSecretProvider, SECRET_ENV_PREFIX};
pub use file::FileSecretProvider;

/// Secret resolution error
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{0}' is unavailable")]
    Unavailable(String),

    #[error("secret store error: {0}")]
    Store(String),
}

/// Source of secret values
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Looks up a single secret; `Ok(None)` when this provider does not hold it
    async fn lookup(&self, name: &str) -> Result<Option<String>, SecretError>;

    /// Resolves every name or fails on the first one that is absent
    async fn resolve(&self, names: &[String]) -> Result<SecretSet, SecretError> {
        let mut values = HashMap::with_capacity(names.len());
        for name in names {
            let value = self
                .lookup(name)
                .await?
                .ok_or_else(|| SecretError::Unavailable(name.clone()))?;
            values.insert(name.clone(), value);
        }
        Ok(SecretSet { values })
    }
}

/// Resolved secret values for one run
///
/// `Debug` never prints values.
#[derive(Clone, Default)]
pub struct SecretSet {
    values: HashMap<String, String>,
}

impl SecretSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Redacted references suitable for storing in a run record
    pub fn refs(&self) -> Vec<SecretRef> {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        names.into_iter().map(SecretRef::redacted).collect()
    }

    /// Environment entries for the given secret names
    ///
    /// Names are mapped to environment-safe keys, `COSMOS-DB-KEY` becomes
    /// `COSMOS_DB_KEY`.
    pub fn env_for(&self, names: &[String]) -> BTreeMap<String, String> {
        names
            .iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| (env_key(name), value.clone()))
            })
            .collect()
    }

    /// Replaces every secret value occurring in `text` with the redaction marker
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for value in self.values.values().filter(|v| !v.is_empty()) {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), REDACTED);
            }
        }
        out
    }
}

impl std::fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_map()
            .entries(names.into_iter().map(|n| (n, REDACTED)))
            .finish()
    }
}

impl VarSource for SecretSet {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

impl FromIterator<(String, String)> for SecretSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Maps a secret name to an environment variable key
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Fixed in-memory secrets
#[derive(Default)]
pub struct StaticSecretProvider {
    values: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).cloned())
    }
}

/// Consults providers in order and returns the first hit
pub struct ChainedSecretProvider {
    providers: Vec<Arc<dyn SecretProvider>>,
}

impl ChainedSecretProvider {
    pub fn new(providers: Vec<Arc<dyn SecretProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl SecretProvider for ChainedSecretProvider {
    async fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        for provider in &self.providers {
            if let Some(value) = provider.lookup(name).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_secret_is_unavailable() {
        let provider = StaticSecretProvider::new().with("OPENAI-API-KEY", "sk-test");
        let names = vec!["OPENAI-API-KEY".to_string(), "COSMOS-DB-KEY".to_string()];

        match provider.resolve(&names).await {
            Err(SecretError::Unavailable(name)) => assert_eq!(name, "COSMOS-DB-KEY"),
            other => panic!("expected unavailable secret, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_prefers_first_provider() {
        let first: Arc<dyn SecretProvider> =
            Arc::new(StaticSecretProvider::new().with("COSMOS-DB-KEY", "vault"));
        let second: Arc<dyn SecretProvider> = Arc::new(
            StaticSecretProvider::new()
                .with("COSMOS-DB-KEY", "env")
                .with("OPENAI-API-KEY", "sk-env"),
        );
        let chain = ChainedSecretProvider::new(vec![first, second]);

        let set = chain
            .resolve(&["COSMOS-DB-KEY".to_string(), "OPENAI-API-KEY".to_string()])
            .await
            .unwrap();
        assert_eq!(set.get("COSMOS-DB-KEY"), Some("vault"));
        assert_eq!(set.get("OPENAI-API-KEY"), Some("sk-env"));
    }

    #[test]
    fn test_debug_and_refs_are_redacted() {
        let set: SecretSet = [("COSMOS-DB-KEY".to_string(), "hunter2".to_string())]
            .into_iter()
            .collect();

        let debug = format!("{:?}", set);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("COSMOS-DB-KEY"));

        let refs = set.refs();
        assert_eq!(refs, vec![SecretRef::redacted("COSMOS-DB-KEY")]);
    }

    #[test]
    fn test_env_for_and_scrub() {
        let set: SecretSet = [
            ("COSMOS-DB-KEY".to_string(), "hunter2".to_string()),
            ("OPENAI-API-KEY".to_string(), "sk-live".to_string()),
        ]
        .into_iter()
        .collect();

        let env = set.env_for(&["COSMOS-DB-KEY".to_string()]);
        assert_eq!(env.len(), 1);
        assert_eq!(env["COSMOS_DB_KEY"], "hunter2");

        assert_eq!(set.scrub("connecting with hunter2"), "connecting with ***");
    }
}
