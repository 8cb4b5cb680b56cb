//! Sluice Lua pipeline definitions
//!
//! Pipelines are described in Lua files that return a table. This crate
//! evaluates them in a restricted sandbox and converts the result into
//! [`sluice_core::domain::pipeline::Pipeline`] values.

pub mod loader;
pub mod parser;
pub mod sandbox;

pub use loader::{load_graph, load_pipelines};
pub use parser::parse_pipeline_definition;
pub use sandbox::create_sandbox;
