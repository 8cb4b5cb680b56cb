//! Sluice Orchestrator
//!
//! Schedules pipeline runs from cron, push, upstream-completion and manual
//! triggers, executes their stages as child processes and serves the HTTP
//! API.

pub mod api;
pub mod bus;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod engine;
pub mod executor;
pub mod notifier;
pub mod quality;
pub mod repository;
pub mod runner;
pub mod scheduler;
pub mod secrets;
