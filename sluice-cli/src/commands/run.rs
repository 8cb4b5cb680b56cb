//! Run command handlers
//!
//! Handles triggering pipelines, listing and inspecting runs, and
//! cancellation. Commands that observe a single run exit with that run's
//! exit code.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_core::domain::run::{Run, StageStatus, TaskStatus};
use sluice_core::dto::event::TriggerOutcome;
use sluice_core::dto::run::{RunSummary, TriggerRun};
use std::time::Duration;
use uuid::Uuid;

use super::colorize_status;
use crate::api::ApiClient;
use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Trigger a pipeline manually
    Trigger {
        /// Pipeline name
        pipeline: String,

        /// Variable overrides as key=value pairs (e.g., confidenceThreshold=0.8)
        #[arg(short, long, value_parser = parse_key_val)]
        var: Vec<(String, String)>,

        /// Wait for the run to finish and exit with its exit code
        #[arg(short, long)]
        wait: bool,
    },
    /// List recent runs
    List {
        /// Only runs of this pipeline
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Cancel an active or queued run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

/// Parse a single key=value pair
fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Handle run commands
///
/// # Arguments
/// * `command` - The run command to execute
/// * `config` - The CLI configuration
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<u8> {
    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Trigger {
            pipeline,
            var,
            wait,
        } => {
            let wait = wait.then_some(config.wait_interval);
            trigger(&client, &pipeline, var, wait).await
        }
        RunCommands::List { pipeline, limit } => list_runs(&client, pipeline, limit).await,
        RunCommands::Get { id } => get_run(&client, &id).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
    }
}

async fn trigger(
    client: &ApiClient,
    pipeline: &str,
    vars: Vec<(String, String)>,
    wait: Option<Duration>,
) -> Result<u8> {
    let req = TriggerRun {
        variables: vars.into_iter().collect(),
    };
    let response = client.trigger_pipeline(pipeline, req).await?;

    let run_id = match response.outcome {
        TriggerOutcome::Started { run_id } => {
            println!("{}", "✓ Run started".green().bold());
            println!("  Pipeline: {}", response.pipeline);
            println!("  Run ID:   {}", run_id.to_string().cyan());
            run_id
        }
        TriggerOutcome::Queued { run_id, depth } => {
            println!("{}", "✓ Run queued".green().bold());
            println!("  Pipeline: {}", response.pipeline);
            println!("  Run ID:   {}", run_id.to_string().cyan());
            println!("  Position: {}", depth);
            run_id
        }
        TriggerOutcome::Skipped { reason, kind } => {
            println!("{}", "Run skipped".yellow().bold());
            if let Some(kind) = kind {
                println!("  Kind:     {:?}", kind);
            }
            println!("  {}", reason.dimmed());
            return Ok(0);
        }
    };

    let Some(interval) = wait else {
        return Ok(0);
    };

    println!();
    println!("{}", "Waiting for the run to finish...".dimmed());
    let run = wait_for_run(client, run_id, interval).await?;
    print_run_details(&run);
    Ok(exit_code(&run))
}

async fn wait_for_run(client: &ApiClient, id: Uuid, interval: Duration) -> Result<Run> {
    loop {
        let run = client.get_run(id).await?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        tokio::time::sleep(interval).await;
    }
}

async fn list_runs(client: &ApiClient, pipeline: Option<String>, limit: usize) -> Result<u8> {
    let runs = match &pipeline {
        Some(name) => client.list_pipeline_runs(name, limit).await?,
        None => client.list_recent_runs(limit).await?,
    };

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(0)
}

async fn get_run(client: &ApiClient, id: &str) -> Result<u8> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    let run = client.get_run(uuid).await?;
    print_run_details(&run);

    Ok(exit_code(&run))
}

async fn cancel_run(client: &ApiClient, id: &str) -> Result<u8> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    let run = client.cancel_run(uuid).await?;

    println!("{}", "✓ Cancellation requested".green().bold());
    println!("  Run ID: {}", run.id.to_string().cyan());
    println!("  Status: {}", colorize_status(run.status));

    Ok(0)
}

/// Exit codes are 0..=3, anything else maps to failure
fn exit_code(run: &Run) -> u8 {
    u8::try_from(run.exit_code()).unwrap_or(1)
}

fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Pipeline: {}", run.pipeline);
    println!("    Status:   {}", colorize_status(run.status));
    println!(
        "    Queued:   {}",
        run.queued_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if run.status.is_terminal() {
        println!("    Exit:     {}", run.exit_code);
    }
    println!();
}

fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Pipeline:  {}", run.pipeline);
    println!("  Status:    {}", colorize_status(run.status));
    println!("  Queued:    {}", run.queued_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(started) = run.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = run.started_at {
            let seconds = completed.signed_duration_since(started).num_seconds();
            println!("  Duration:  {}s", seconds);
        }
    }

    if !run.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        for (key, value) in &run.variables {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if !run.stages.is_empty() {
        println!("\n{}", "Stages:".bold());
    }
    for stage in &run.stages {
        let status = format!("{:?}", stage.status);
        let status = match stage.status {
            StageStatus::Succeeded => status.green(),
            StageStatus::Failed => status.red(),
            StageStatus::Running => status.yellow(),
            _ => status.dimmed(),
        };
        println!("  {} {} {}", "▸".cyan(), stage.name.bold(), status);

        for task in &stage.tasks {
            let mark = match task.status {
                TaskStatus::Succeeded if !task.warning => "✓".green(),
                _ if task.warning => "!".yellow(),
                _ => "✗".red(),
            };
            println!(
                "    {} {} {}",
                mark,
                task.name,
                format!("({} attempt(s), {}ms)", task.attempts, task.duration_ms).dimmed()
            );
            if let Some(error) = &task.error {
                println!("      {}", error.red());
            }
        }
        for warning in &stage.warnings {
            println!("    {} {}", "warning:".yellow(), warning);
        }
    }

    if !run.quality.is_empty() {
        println!("\n{}", "Quality:".bold());
        for report in &run.quality {
            println!(
                "  {} score {:.2} {:?}",
                report.stage.bold(),
                report.score,
                report.verdict
            );
        }
    }

    if let Some(failure) = &run.failure {
        println!("\n{}", "Failure:".bold());
        println!("  {}", failure.to_string().red());
    }

    println!("\n  Exit Code: {}", run.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("confidenceThreshold=0.8").unwrap(),
            ("confidenceThreshold".to_string(), "0.8".to_string())
        );
        assert_eq!(
            parse_key_val("outDir=/tmp/a=b").unwrap(),
            ("outDir".to_string(), "/tmp/a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }
}
