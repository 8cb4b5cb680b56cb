//! Pipeline command handlers
//!
//! Handles pipeline listing, inspection, latest status and local validation
//! of definition files.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_core::domain::pipeline::Pipeline;
use std::path::Path;

use super::colorize_status;
use crate::api::ApiClient;
use crate::config::Config;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// List all pipelines in dependency order
    List,
    /// Show a pipeline definition
    Show {
        /// Pipeline name
        name: String,
    },
    /// Show the status of a pipeline's latest run
    Status {
        /// Pipeline name
        name: String,
    },
    /// Validate a definition file or a directory of definitions locally
    Validate {
        /// Path to a `.lua` file or a directory of them
        path: String,
    },
}

/// Handle pipeline commands
///
/// # Arguments
/// * `command` - The pipeline command to execute
/// * `config` - The CLI configuration
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<u8> {
    if let PipelineCommands::Validate { path } = &command {
        return Ok(validate(Path::new(path)));
    }

    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::List => list_pipelines(&client).await,
        PipelineCommands::Show { name } => show_pipeline(&client, &name).await,
        PipelineCommands::Status { name } => pipeline_status(&client, &name).await,
        PipelineCommands::Validate { .. } => Ok(0),
    }
}

async fn list_pipelines(client: &ApiClient) -> Result<u8> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
        return Ok(0);
    }

    println!("{}", format!("Found {} pipeline(s):", pipelines.len()).bold());
    println!();
    for summary in pipelines {
        let status = summary
            .latest_status
            .map(|s| colorize_status(s).to_string())
            .unwrap_or_else(|| "never run".dimmed().to_string());

        println!("  {} {}", "▸".cyan(), summary.name.bold());
        if let Some(desc) = &summary.description {
            println!("    {}", desc.dimmed());
        }
        println!("    Trigger:  {}", summary.trigger);
        if !summary.upstream.is_empty() {
            println!("    Upstream: {}", summary.upstream.join(", "));
        }
        println!("    Stages:   {}", summary.stage_count);
        println!("    Latest:   {}", status);
        println!();
    }

    Ok(0)
}

async fn show_pipeline(client: &ApiClient, name: &str) -> Result<u8> {
    let pipeline = client.get_pipeline(name).await?;
    print_pipeline_details(&pipeline);
    Ok(0)
}

async fn pipeline_status(client: &ApiClient, name: &str) -> Result<u8> {
    let status = client.pipeline_status(name).await?;

    match (status.run_id, status.status) {
        (Some(run_id), Some(run_status)) => {
            println!(
                "{} {} ({})",
                status.pipeline.bold(),
                colorize_status(run_status),
                run_id.to_string().dimmed()
            );
        }
        _ => println!("{} {}", status.pipeline.bold(), "never run".dimmed()),
    }

    if let Some(completed) = status.last_completed {
        if status.run_id != Some(completed.run_id) {
            println!(
                "  Last completed: {} ({})",
                colorize_status(completed.status),
                completed.run_id.to_string().dimmed()
            );
        }
    }

    Ok(0)
}

/// Parses definitions without contacting the orchestrator
///
/// Returns 3 when any definition is invalid.
fn validate(path: &Path) -> u8 {
    let result = if path.is_dir() {
        sluice_lua::load_graph(path).map(|graph| graph.pipelines().cloned().collect::<Vec<_>>())
    } else {
        std::fs::read_to_string(path)
            .context(format!("Failed to read {}", path.display()))
            .and_then(|source| sluice_lua::parse_pipeline_definition(&source))
            .map(|pipeline| vec![pipeline])
    };

    match result {
        Ok(pipelines) => {
            for pipeline in &pipelines {
                println!(
                    "{} {} ({} stage(s), {})",
                    "✓".green().bold(),
                    pipeline.name.bold(),
                    pipeline.stages.len(),
                    pipeline.trigger
                );
            }
            0
        }
        Err(e) => {
            eprintln!("{} {:#}", "✗ Invalid definition:".red().bold(), e);
            3
        }
    }
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  Name:     {}", pipeline.name.cyan());
    if let Some(desc) = &pipeline.description {
        println!("  Desc:     {}", desc);
    }
    println!("  Trigger:  {}", pipeline.trigger);
    if !pipeline.upstream.is_empty() {
        println!("  Upstream: {}", pipeline.upstream.join(", "));
    }

    if !pipeline.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        for (key, value) in &pipeline.variables {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    println!("\n{}", "Stages:".bold());
    for stage in &pipeline.stages {
        print!("  {} {}", "▸".cyan(), stage.name.bold());
        if !stage.depends_on.is_empty() {
            print!(" {}", format!("after {}", stage.depends_on.join(", ")).dimmed());
        }
        println!();

        for task in &stage.tasks {
            let mut line = format!("    {} {}", task.name, task.command.dimmed());
            if task.best_effort {
                line.push_str(&format!(" {}", "(best effort)".yellow()));
            }
            println!("{}", line);
            if !task.secrets.is_empty() {
                println!("      secrets: {}", task.secrets.join(", ").dimmed());
            }
        }

        if let Some(gate) = &stage.quality_gate {
            println!(
                "    {} {:?} on {}",
                "gate".magenta(),
                gate.check,
                gate.artifact.dimmed()
            );
        }
    }
}
