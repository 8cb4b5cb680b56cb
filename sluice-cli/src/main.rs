//! Sluice CLI
//!
//! Command-line interface for the Sluice orchestrator. The process exit
//! code mirrors the run outcome: 0 succeeded, 1 failed, 2 cancelled,
//! 3 secret or configuration error.

mod api;
mod commands;
mod config;
mod id_resolver;
mod types;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice pipeline orchestration CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "SLUICE_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    /// Seconds between polls while waiting for a run
    #[arg(
        long,
        env = "SLUICE_WAIT_INTERVAL",
        default_value = "1",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    wait_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::new(cli.orchestrator_url, cli.wait_interval);

    match handle_command(cli.command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
