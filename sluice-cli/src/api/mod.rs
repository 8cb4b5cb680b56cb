//! API client module
//!
//! HTTP client for communicating with the Sluice orchestrator API.

use anyhow::{Context, Result};
use reqwest::Client;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::Run;
use sluice_core::dto::event::{PushEvent, TriggerResponse};
use sluice_core::dto::pipeline::{PipelineStatus, PipelineSummary};
use sluice_core::dto::run::{RunSummary, TriggerRun};
use uuid::Uuid;

/// HTTP client for the Sluice orchestrator API
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the orchestrator API
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// List all pipelines in dependency order
    pub async fn list_pipelines(&self) -> Result<Vec<PipelineSummary>> {
        let url = format!("{}/api/pipelines", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send list pipelines request")?;

        self.handle_response(response).await
    }

    /// Get a pipeline definition by name
    ///
    /// # Arguments
    /// * `name` - Pipeline name
    ///
    /// # Returns
    /// The pipeline definition as loaded by the orchestrator
    pub async fn get_pipeline(&self, name: &str) -> Result<Pipeline> {
        let url = format!("{}/api/pipelines/{}", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send get pipeline request")?;

        self.handle_response(response).await
    }

    /// Latest run status of a pipeline
    ///
    /// # Arguments
    /// * `name` - Pipeline name
    ///
    /// # Returns
    /// The latest run and the latest completed run, if any
    pub async fn pipeline_status(&self, name: &str) -> Result<PipelineStatus> {
        let url = format!("{}/api/pipelines/{}/status", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send pipeline status request")?;

        self.handle_response(response).await
    }

    /// List runs of a pipeline, newest first
    ///
    /// # Arguments
    /// * `name` - Pipeline name
    /// * `limit` - Maximum number of runs to return
    pub async fn list_pipeline_runs(&self, name: &str, limit: usize) -> Result<Vec<RunSummary>> {
        let url = format!("{}/api/pipelines/{}/runs", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .context("Failed to send list runs request")?;

        self.handle_response(response).await
    }

    /// Manually trigger a pipeline
    ///
    /// # Arguments
    /// * `name` - Pipeline name
    /// * `req` - Variable overrides for the run
    ///
    /// # Returns
    /// Whether the run was started, queued or skipped
    pub async fn trigger_pipeline(&self, name: &str, req: TriggerRun) -> Result<TriggerResponse> {
        let url = format!("{}/api/pipelines/{}/trigger", self.base_url, name);
        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to send trigger request")?;

        self.handle_response(response).await
    }

    /// Report a branch push
    ///
    /// # Arguments
    /// * `event` - Branch and optional commit that was pushed
    ///
    /// # Returns
    /// One trigger outcome per pipeline watching the branch
    pub async fn push(&self, event: PushEvent) -> Result<Vec<TriggerResponse>> {
        let url = format!("{}/api/events/push", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&event)
            .send()
            .await
            .context("Failed to send push event")?;

        self.handle_response(response).await
    }

    /// Most recent runs across all pipelines
    ///
    /// # Arguments
    /// * `limit` - Maximum number of runs to return
    pub async fn list_recent_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let url = format!("{}/api/runs", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .context("Failed to send list runs request")?;

        self.handle_response(response).await
    }

    /// Get the full record of a run
    ///
    /// # Arguments
    /// * `id` - Run ID
    pub async fn get_run(&self, id: Uuid) -> Result<Run> {
        let url = format!("{}/api/runs/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send get run request")?;

        self.handle_response(response).await
    }

    /// Cancel an active or queued run
    ///
    /// # Arguments
    /// * `id` - Run ID
    ///
    /// # Returns
    /// Summary of the run as recorded at cancellation
    pub async fn cancel_run(&self, id: Uuid) -> Result<RunSummary> {
        let url = format!("{}/api/runs/{}/cancel", self.base_url, id);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to send cancel request")?;

        self.handle_response(response).await
    }

    /// Handle API response and deserialize JSON
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse response JSON")
    }
}
