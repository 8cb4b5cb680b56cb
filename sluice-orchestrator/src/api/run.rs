//! Run API Handlers
//!
//! HTTP endpoints for triggering, inspecting and cancelling runs.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use sluice_core::domain::run::Run;
use sluice_core::dto::event::TriggerResponse;
use sluice_core::dto::run::{RunSummary, TriggerRun};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::engine::Orchestrator;

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// POST /api/pipelines/{name}/trigger
/// Manually trigger a pipeline, bypassing trigger matching and upstream gating
pub async fn trigger_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
    body: Option<Json<TriggerRun>>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let Json(req) = body.unwrap_or_default();
    tracing::info!("Manual trigger of pipeline: {}", name);

    let outcome = orchestrator.trigger(&name, req.variables).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            pipeline: name,
            outcome,
        }),
    ))
}

/// GET /api/pipelines/{name}/runs
/// List runs of a pipeline, newest first
pub async fn list_pipeline_runs(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs of pipeline: {}", name);

    let runs = orchestrator.list_runs(&name).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    Ok(Json(runs.iter().take(limit).map(RunSummary::from).collect()))
}

/// GET /api/runs
/// List recent runs across pipelines
pub async fn list_recent_runs(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    let runs = orchestrator
        .recent_runs(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;

    Ok(Json(runs.iter().map(RunSummary::from).collect()))
}

/// GET /api/runs/{id}
/// Get the full run record
pub async fn get_run(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    Ok(Json(orchestrator.get_run(id).await?))
}

/// POST /api/runs/{id}/cancel
/// Cancel an active or queued run
pub async fn cancel_run(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunSummary>)> {
    tracing::info!("Cancelling run: {}", id);

    let run = orchestrator.cancel(id).await?;

    Ok((StatusCode::ACCEPTED, Json(RunSummary::from(&run))))
}
