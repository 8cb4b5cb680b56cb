//! Repository Module
//!
//! Append-only run log. Runs are inserted once when queued and updated in
//! place as they progress; "latest" queries follow insertion order.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sluice_core::domain::run::Run;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryRunRepository;
pub use postgres::PostgresRunRepository;

/// Repository error type
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("run {0} already exists")]
    Duplicate(Uuid),
}

/// Storage for run records
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Appends a new run
    async fn insert(&self, run: &Run) -> Result<(), RepositoryError>;

    /// Replaces the stored record of an existing run
    async fn update(&self, run: &Run) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RepositoryError>;

    /// Runs of a pipeline, newest first
    async fn list_by_pipeline(&self, pipeline: &str) -> Result<Vec<Run>, RepositoryError>;

    /// Most recent runs across all pipelines, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, RepositoryError>;

    /// Most recently queued run of a pipeline, whatever its status
    async fn latest(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError>;

    /// Most recently queued run of a pipeline that reached a terminal status
    async fn latest_terminal(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError>;

    /// Runs still recorded as queued or running, oldest first
    async fn list_unfinished(&self) -> Result<Vec<Run>, RepositoryError>;
}
