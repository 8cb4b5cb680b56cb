use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use super::{SecretError, SecretProvider};

/// Secrets loaded from a JSON object file (`{"COSMOS-DB-KEY": "..."}`)
pub struct FileSecretProvider {
    values: HashMap<String, String>,
}

impl FileSecretProvider {
    /// Loads the vault file once; the file is not watched for changes
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SecretError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SecretError::Store(format!("failed to read {}: {}", path.display(), e))
        })?;
        let values: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            SecretError::Store(format!("invalid secrets file {}: {}", path.display(), e))
        })?;

        tracing::info!(count = values.len(), "Loaded secrets file");
        Ok(Self { values })
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_vault_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"COSMOS-DB-KEY": "cosmos-secret"}}"#).unwrap();

        let provider = FileSecretProvider::load(file.path()).unwrap();
        assert_eq!(
            provider.lookup("COSMOS-DB-KEY").await.unwrap().as_deref(),
            Some("cosmos-secret")
        );
        assert!(provider.lookup("OPENAI-API-KEY").await.unwrap().is_none());
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            FileSecretProvider::load(file.path()),
            Err(SecretError::Store(_))
        ));
    }
}
