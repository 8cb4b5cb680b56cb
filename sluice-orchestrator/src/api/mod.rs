//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod pipeline;
pub mod run;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::engine::Orchestrator;

/// Create the main API router with all endpoints
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/api/pipelines", get(pipeline::list_pipelines))
        .route("/api/pipelines/{name}", get(pipeline::get_pipeline))
        .route("/api/pipelines/{name}/status", get(pipeline::pipeline_status))
        .route("/api/pipelines/{name}/runs", get(run::list_pipeline_runs))
        .route("/api/pipelines/{name}/trigger", post(run::trigger_pipeline))
        // Trigger events
        .route("/api/events/push", post(event::push))
        // Run endpoints
        .route("/api/runs", get(run::list_recent_runs))
        .route("/api/runs/{id}", get(run::get_run))
        .route("/api/runs/{id}/cancel", post(run::cancel_run))
        // Add state and middleware
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}
