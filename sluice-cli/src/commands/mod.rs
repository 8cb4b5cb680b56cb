//! Commands module
//!
//! Defines all CLI commands and their handlers. Every handler returns the
//! process exit code.

mod pipeline;
mod push;
mod run;

pub use pipeline::PipelineCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_core::domain::run::RunStatus;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline inspection and validation
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Run management
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Report a branch push, triggering pipelines bound to the branch
    Push {
        /// Branch that received the push
        branch: String,

        /// Commit identifier
        #[arg(short, long)]
        commit: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<u8> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Push { branch, commit } => push::handle_push(branch, commit, config).await,
    }
}

/// Colorize a run status for display
pub(crate) fn colorize_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Queued => text.dimmed(),
        RunStatus::Running => text.yellow(),
        RunStatus::Succeeded => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::Cancelled => text.magenta(),
    }
}
