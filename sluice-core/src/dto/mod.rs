//! Data Transfer Objects
//!
//! Lightweight shapes exchanged between the orchestrator HTTP API and the CLI.

pub mod event;
pub mod pipeline;
pub mod run;
