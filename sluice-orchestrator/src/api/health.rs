//! Health Check API Handler

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::engine::Orchestrator;

/// GET /health
/// Liveness plus the number of loaded pipelines
pub async fn health_check(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "pipelines": orchestrator.graph().len(),
    }))
}
