use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sluice_orchestrator::api;
use sluice_orchestrator::circuit_breaker::{BreakerConfig, CircuitBreaker};
use sluice_orchestrator::config::Config;
use sluice_orchestrator::db;
use sluice_orchestrator::engine::{EngineSettings, Orchestrator};
use sluice_orchestrator::executor::{ExecutionContext, ExecutionSettings};
use sluice_orchestrator::notifier::{LogChannel, NotificationChannel, Notifier, WebhookChannel};
use sluice_orchestrator::repository::{InMemoryRunRepository, PostgresRunRepository, RunRepository};
use sluice_orchestrator::runner::ProcessTaskRunner;
use sluice_orchestrator::secrets::{
    ChainedSecretProvider, EnvSecretProvider, FileSecretProvider, SecretProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sluice Orchestrator...");

    let config = Config::load().context("Invalid configuration")?;
    info!(
        "Loaded configuration: bind_addr={}, pipelines_dir={}",
        config.bind_addr,
        config.pipelines_dir.display()
    );

    let graph = sluice_lua::load_graph(&config.pipelines_dir)?;
    info!("Loaded {} pipeline(s)", graph.len());
    for name in graph.topological_order() {
        info!("  - {}", name);
    }

    let repository = create_repository(&config).await?;
    let secrets = create_secret_provider(&config)?;
    let notifier = create_notifier(&config)?;

    let ctx = ExecutionContext {
        runner: Arc::new(ProcessTaskRunner::new(config.output_limit)),
        breaker: Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_threshold,
            cooldown: config.breaker_cooldown,
        })),
        secrets,
        repository,
        notifier,
        settings: ExecutionSettings {
            default_timeout: config.task_timeout,
            hard_floor: config.hard_floor,
        },
    };

    let orchestrator = Orchestrator::new(
        graph,
        ctx,
        EngineSettings {
            queue_depth: config.push_queue_depth,
            poll_interval: config.poll_interval,
        },
    );
    orchestrator
        .recover()
        .await
        .context("Failed to recover unfinished runs")?;
    orchestrator.start();

    // Build router with all API endpoints
    let app = api::create_router(Arc::clone(&orchestrator));

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    orchestrator.shutdown();
    info!("Orchestrator stopped");

    Ok(())
}

async fn create_repository(config: &Config) -> Result<Arc<dyn RunRepository>> {
    let Some(database_url) = &config.database_url else {
        info!("DATABASE_URL not set, keeping the run log in memory");
        return Ok(Arc::new(InMemoryRunRepository::new()));
    };

    info!("Connecting to database...");
    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database ready");

    Ok(Arc::new(PostgresRunRepository::new(pool)))
}

fn create_secret_provider(config: &Config) -> Result<Arc<dyn SecretProvider>> {
    let mut providers: Vec<Arc<dyn SecretProvider>> = Vec::new();

    if let Some(path) = &config.secrets_file {
        let file = FileSecretProvider::load(path)
            .with_context(|| format!("Failed to load secrets file {}", path.display()))?;
        providers.push(Arc::new(file));
    }
    providers.push(Arc::new(EnvSecretProvider::new()));

    Ok(Arc::new(ChainedSecretProvider::new(providers)))
}

fn create_notifier(config: &Config) -> Result<Notifier> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];

    if let Some(url) = &config.webhook_url {
        channels.push(Arc::new(WebhookChannel::new(url.clone())?));
    }
    info!("Notifier configured with {} channel(s)", channels.len());

    Ok(Notifier::new(channels))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
