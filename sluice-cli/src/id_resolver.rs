//! ID resolver module
//!
//! Resolves run ID prefixes to full UUIDs by querying recent runs, so
//! users can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::types::IdOrPrefix;

/// How many recent runs are searched for a prefix
const RESOLVE_WINDOW: usize = 500;

/// Resolve a run ID or prefix to a full UUID
///
/// # Errors
/// Returns an error if no recent run matches the prefix, if several do, or
/// if the API call fails.
pub async fn resolve_run_id(client: &ApiClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_recent_runs(RESOLVE_WINDOW)
        .await
        .context("Failed to fetch runs for ID resolution")?;

    let matches: Vec<Uuid> = runs
        .iter()
        .map(|r| r.id)
        .filter(|id| id_or_prefix.matches(id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No run found with ID starting with '{}'", id_or_prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
