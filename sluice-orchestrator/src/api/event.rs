//! Trigger Event API Handlers

use axum::{Json, extract::State};
use sluice_core::dto::event::{PushEvent, TriggerResponse};
use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::engine::Orchestrator;

/// POST /api/events/push
/// Branch push notification; schedules every pipeline bound to the branch
pub async fn push(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(event): Json<PushEvent>,
) -> ApiResult<Json<Vec<TriggerResponse>>> {
    if event.branch.trim().is_empty() {
        return Err(ApiError::BadRequest("branch cannot be empty".to_string()));
    }

    tracing::info!("Push to branch: {}", event.branch);

    Ok(Json(orchestrator.push(event).await?))
}
