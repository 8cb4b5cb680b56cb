//! Push command handler

use anyhow::Result;
use colored::*;
use sluice_core::dto::event::{PushEvent, TriggerOutcome};

use crate::api::ApiClient;
use crate::config::Config;

pub async fn handle_push(branch: String, commit: Option<String>, config: &Config) -> Result<u8> {
    let client = ApiClient::new(&config.orchestrator_url);
    let responses = client.push(PushEvent { branch: branch.clone(), commit }).await?;

    if responses.is_empty() {
        println!("{}", format!("No pipeline is triggered by '{}'.", branch).yellow());
        return Ok(0);
    }

    for response in responses {
        match response.outcome {
            TriggerOutcome::Started { run_id } => println!(
                "  {} {} started run {}",
                "▸".cyan(),
                response.pipeline.bold(),
                run_id.to_string().cyan()
            ),
            TriggerOutcome::Queued { run_id, depth } => println!(
                "  {} {} queued run {} (depth {})",
                "▸".cyan(),
                response.pipeline.bold(),
                run_id.to_string().cyan(),
                depth
            ),
            TriggerOutcome::Skipped { reason, .. } => println!(
                "  {} {} skipped: {}",
                "▸".cyan(),
                response.pipeline.bold(),
                reason.dimmed()
            ),
        }
    }

    Ok(0)
}
