//! Postgres run log
//!
//! Each run is one row; the record is stored as JSONB next to the columns
//! used for filtering and ordering.

use async_trait::async_trait;
use sluice_core::domain::run::Run;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{RepositoryError, RunRepository};

pub struct PostgresRunRepository {
    pool: PgPool,
}

impl PostgresRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type RecordRow = (Json<Run>,);

fn into_runs(rows: Vec<RecordRow>) -> Vec<Run> {
    rows.into_iter().map(|(Json(run),)| run).collect()
}

#[async_trait]
impl RunRepository for PostgresRunRepository {
    async fn insert(&self, run: &Run) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO runs (id, pipeline, status, queued_at, completed_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(run.id)
        .bind(&run.pipeline)
        .bind(run.status.to_string())
        .bind(run.queued_at)
        .bind(run.completed_at)
        .bind(Json(run))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Duplicate(run.id));
        }
        Ok(())
    }

    async fn update(&self, run: &Run) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE runs
            SET status = $2, completed_at = $3, record = $4
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status.to_string())
        .bind(run.completed_at)
        .bind(Json(run))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(run.id));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query_as::<_, RecordRow>("SELECT record FROM runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(Json(run),)| run))
    }

    async fn list_by_pipeline(&self, pipeline: &str) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM runs WHERE pipeline = $1 ORDER BY seq DESC",
        )
        .bind(pipeline)
        .fetch_all(&self.pool)
        .await?;

        Ok(into_runs(rows))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM runs ORDER BY seq DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(into_runs(rows))
    }

    async fn latest(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM runs WHERE pipeline = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(pipeline)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(run),)| run))
    }

    async fn latest_terminal(&self, pipeline: &str) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT record FROM runs
            WHERE pipeline = $1 AND status IN ('Succeeded', 'Failed', 'Cancelled')
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(run),)| run))
    }

    async fn list_unfinished(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT record FROM runs WHERE status IN ('Queued', 'Running') ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(into_runs(rows))
    }
}
