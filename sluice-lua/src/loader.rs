//! Loads every pipeline definition in a directory

use anyhow::{Context, Result};
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::graph::PipelineGraph;
use std::path::{Path, PathBuf};

use crate::parser::parse_pipeline_definition;

/// Parses all `*.lua` files in `dir`, in file name order
pub fn load_pipelines(dir: impl AsRef<Path>) -> Result<Vec<Pipeline>> {
    let dir = dir.as_ref();

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .context(format!("Failed to read pipeline directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "lua"))
        .collect();
    paths.sort();

    let mut pipelines = Vec::with_capacity(paths.len());
    for path in paths {
        let source = std::fs::read_to_string(&path)
            .context(format!("Failed to read {}", path.display()))?;
        let pipeline = parse_pipeline_definition(&source)
            .context(format!("Invalid pipeline definition in {}", path.display()))?;

        tracing::debug!(pipeline = %pipeline.name, path = %path.display(), "Loaded pipeline");
        pipelines.push(pipeline);
    }

    Ok(pipelines)
}

/// Loads a directory and builds the validated pipeline graph
pub fn load_graph(dir: impl AsRef<Path>) -> Result<PipelineGraph> {
    let pipelines = load_pipelines(dir)?;
    let graph = PipelineGraph::build(pipelines).context("Invalid pipeline graph")?;

    tracing::info!(count = graph.len(), "Pipeline graph loaded");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, file: &str, source: &str) {
        fs::write(dir.path().join(file), source).unwrap();
    }

    fn definition(name: &str, trigger: &str) -> String {
        format!(
            r#"return pipeline.define {{
                name = "{name}",
                trigger = {trigger},
                stages = {{ pipeline.stage {{ name = "run", tasks = {{
                    pipeline.task {{ name = "step", command = "true" }},
                }} }} }},
            }}"#
        )
    }

    #[test]
    fn test_load_directory_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.lua", &definition("analysis", r#"pipeline.after("data-collection")"#));
        write(&dir, "a.lua", &definition("data-collection", r#"pipeline.schedule("0 2 * * *")"#));
        write(&dir, "notes.txt", "not a pipeline");

        let pipelines = load_pipelines(dir.path()).unwrap();
        let names: Vec<&str> = pipelines.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["data-collection", "analysis"]);
    }

    #[test]
    fn test_load_graph_orders_upstream_first() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.lua", &definition("analysis", r#"pipeline.after("data-collection")"#));
        write(&dir, "b.lua", &definition("data-collection", "pipeline.manual()"));

        let graph = load_graph(dir.path()).unwrap();
        assert_eq!(
            graph.topological_order(),
            &["data-collection".to_string(), "analysis".to_string()]
        );
    }

    #[test]
    fn test_bad_file_names_path() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.lua", "return 42");

        let err = load_pipelines(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.lua"));
    }

    #[test]
    fn test_unknown_upstream_fails_graph() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.lua", &definition("analysis", r#"pipeline.after("missing")"#));

        assert!(load_graph(dir.path()).is_err());
    }
}
