//! In-memory run log

use async_trait::async_trait;
use sluice_core::domain::run::Run;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepositoryError, RunRepository};

/// Run log kept in process memory, in insertion order
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<Vec<Run>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn insert(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        if runs.iter().any(|r| r.id == run.id) {
            return Err(RepositoryError::Duplicate(run.id));
        }
        runs.push(run.clone());
        Ok(())
    }

    async fn update(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        let slot = runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or(RepositoryError::NotFound(run.id))?;
        *slot = run.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.runs.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn list_by_pipeline(&self, pipeline: &str) -> Result<Vec<Run>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.pipeline == pipeline)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, RepositoryError> {
        Ok(self.runs.read().await.iter().rev().take(limit).cloned().collect())
    }

    async fn latest(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.pipeline == pipeline)
            .cloned())
    }

    async fn latest_terminal(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.pipeline == pipeline && r.status.is_terminal())
            .cloned())
    }

    async fn list_unfinished(&self) -> Result<Vec<Run>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .iter()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }
}
