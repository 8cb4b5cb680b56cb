use async_trait::async_trait;

use super::{SecretError, SecretProvider, env_key};

/// Prefix of environment variables holding secrets
pub const SECRET_ENV_PREFIX: &str = "SLUICE_SECRET_";

/// Reads `SLUICE_SECRET_<NAME>` from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self
    }

    /// Environment variable consulted for a secret name
    pub fn variable_for(name: &str) -> String {
        format!("{}{}", SECRET_ENV_PREFIX, env_key(name))
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(std::env::var(Self::variable_for(name)).ok())
    }
}
