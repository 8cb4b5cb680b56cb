//! Sluice Core
//!
//! Core types and abstractions for the Sluice pipeline orchestrator.
//!
//! This crate contains:
//! - Domain types: pipelines, stages, tasks, triggers, runs, events
//! - DTOs: request/response shapes shared by the orchestrator API and CLI
//! - Variable templating and pipeline graph validation

pub mod domain;
pub mod dto;
pub mod error;
pub mod graph;
pub mod schedule;
pub mod template;

pub use error::{ErrorKind, SluiceError, TemplateError};
