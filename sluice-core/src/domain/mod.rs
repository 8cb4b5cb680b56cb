//! Core domain types
//!
//! These types are shared between the orchestrator (which executes and
//! persists runs), the Lua definition loader and the CLI.

pub mod event;
pub mod pipeline;
pub mod quality;
pub mod run;
pub mod secret;
