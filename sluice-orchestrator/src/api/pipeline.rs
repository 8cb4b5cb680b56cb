//! Pipeline API Handlers
//!
//! Read-only views of the loaded pipeline graph.

use axum::{
    Json,
    extract::{Path, State},
};
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::dto::pipeline::{CompletedRun, PipelineStatus, PipelineSummary};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::engine::Orchestrator;

/// GET /api/pipelines
/// List pipelines in dependency order
pub async fn list_pipelines(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing all pipelines");

    let graph = orchestrator.graph();
    let mut summaries = Vec::with_capacity(graph.len());
    for name in graph.topological_order() {
        let pipeline = orchestrator.pipeline(name)?;
        let latest = orchestrator.latest_run_status(name).await?;
        summaries.push(PipelineSummary::new(
            pipeline,
            graph.upstream_of(name).to_vec(),
            latest,
        ));
    }

    Ok(Json(summaries))
}

/// GET /api/pipelines/{name}
/// Get a pipeline definition
pub async fn get_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", name);

    Ok(Json(orchestrator.pipeline(&name)?.clone()))
}

/// GET /api/pipelines/{name}/status
/// Latest run status of a pipeline
pub async fn pipeline_status(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(name): Path<String>,
) -> ApiResult<Json<PipelineStatus>> {
    tracing::debug!("Getting status of pipeline: {}", name);

    let latest = orchestrator.latest_run(&name).await?;
    let completed = orchestrator.latest_completed_run(&name).await?;

    Ok(Json(PipelineStatus {
        pipeline: name,
        run_id: latest.as_ref().map(|run| run.id),
        status: latest.map(|run| run.status),
        last_completed: completed.map(|run| CompletedRun {
            run_id: run.id,
            status: run.status,
            completed_at: run.completed_at,
        }),
    }))
}
