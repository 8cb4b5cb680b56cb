use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Append-only run log; the full record lives in JSONB
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id UUID PRIMARY KEY,
            pipeline VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            seq BIGSERIAL NOT NULL,
            queued_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ,
            record JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_pipeline_seq ON runs(pipeline, seq DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed");

    Ok(())
}
