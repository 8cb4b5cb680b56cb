//! Pipeline definition parser
//!
//! Evaluates a Lua pipeline definition in the sandbox and converts the
//! returned table into a [`Pipeline`]. Structural validation (stage graph,
//! template references, cron syntax) runs on the result before it is returned.

use anyhow::{Context, Result};
use mlua::{Table, Value};
use sluice_core::domain::pipeline::{
    Pipeline, QualityCheck, QualityGateSpec, RetryPolicy, RunCondition, Stage, Task, Trigger,
};
use sluice_core::graph::validate_pipeline;
use std::collections::BTreeMap;

use crate::sandbox::create_sandbox;

/// Parse a pipeline definition from Lua source code
///
/// # Example
/// ```no_run
/// use sluice_lua::parser::parse_pipeline_definition;
///
/// let source = r#"
///     return pipeline.define {
///         name = "data-collection",
///         trigger = pipeline.schedule("0 0 2 * * *"),
///         variables = { batchSize = 1000 },
///         stages = {
///             pipeline.stage {
///                 name = "collect",
///                 tasks = {
///                     pipeline.task {
///                         name = "fetch",
///                         command = "python",
///                         args = { "scripts/collect.py", "--batch-size", "$(batchSize)" },
///                         secrets = { pipeline.secret("COSMOS-DB-KEY") },
///                     },
///                 },
///             },
///         },
///     }
/// "#;
///
/// let pipeline = parse_pipeline_definition(source)?;
/// assert_eq!(pipeline.name, "data-collection");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn parse_pipeline_definition(source: &str) -> Result<Pipeline> {
    let lua = create_sandbox().context("Failed to create definition sandbox")?;

    let table: Table = lua
        .load(source)
        .set_name("pipeline")
        .eval()
        .context("Failed to evaluate pipeline definition")?;

    let pipeline = pipeline_from_table(&table)?;
    validate_pipeline(&pipeline)?;

    Ok(pipeline)
}

fn pipeline_from_table(table: &Table) -> Result<Pipeline> {
    let name: String = table
        .get("name")
        .context("Pipeline must have a 'name' field")?;

    let description: Option<String> = table
        .get("description")
        .context("Field 'description' must be a string")?;

    let trigger = parse_trigger(table).context(format!("Pipeline '{}' has an invalid trigger", name))?;
    let upstream = string_list(table, "upstream")?;
    let variables = string_map(table, "variables")?;
    let stages = parse_stages(table).context(format!("Pipeline '{}' has invalid stages", name))?;

    Ok(Pipeline {
        name,
        description,
        trigger,
        upstream,
        variables,
        stages,
    })
}

/// Parse the 'trigger' field, defaulting to a manual trigger
fn parse_trigger(table: &Table) -> Result<Trigger> {
    let value: Value = table.get("trigger")?;

    let trigger = match value {
        Value::Nil => return Ok(Trigger::Manual),
        Value::Table(trigger) => trigger,
        _ => anyhow::bail!("Field 'trigger' must be a table"),
    };

    let kind: String = trigger
        .get("kind")
        .context("Trigger must have a 'kind' field")?;

    match kind.as_str() {
        "scheduled" => Ok(Trigger::Scheduled {
            cron: trigger.get("cron").context("Scheduled trigger needs 'cron'")?,
        }),
        "branch_push" => Ok(Trigger::BranchPush {
            branch: trigger
                .get("branch")
                .context("Push trigger needs 'branch'")?,
        }),
        "upstream_completion" => Ok(Trigger::UpstreamCompletion {
            pipeline: trigger
                .get("pipeline")
                .context("Upstream trigger needs 'pipeline'")?,
        }),
        "manual" => Ok(Trigger::Manual),
        other => anyhow::bail!("Unknown trigger kind '{}'", other),
    }
}

/// Parse the 'stages' field from the pipeline table
fn parse_stages(table: &Table) -> Result<Vec<Stage>> {
    let stages_table: Table = table
        .get("stages")
        .context("Pipeline must have a 'stages' field")?;

    let mut stages = Vec::new();
    for entry in stages_table.sequence_values::<Table>() {
        let stage_table = entry.context("Failed to read stage entry")?;

        let name: String = stage_table
            .get("name")
            .context("Stage must have a 'name' field")?;

        let depends_on = string_list(&stage_table, "depends_on")?;
        let condition = parse_condition(&stage_table)
            .context(format!("Stage '{}' has an invalid condition", name))?;
        let tasks = parse_tasks(&stage_table)
            .context(format!("Stage '{}' has invalid tasks", name))?;
        let quality_gate = parse_quality_gate(&stage_table)
            .context(format!("Stage '{}' has an invalid quality gate", name))?;

        stages.push(Stage {
            name,
            depends_on,
            condition,
            tasks,
            quality_gate,
        });
    }

    if stages.is_empty() {
        anyhow::bail!("Pipeline must have at least one stage");
    }

    Ok(stages)
}

/// `condition = { variable = "branch", equals = "main" }`
fn parse_condition(stage: &Table) -> Result<RunCondition> {
    match stage.get::<Value>("condition")? {
        Value::Nil => Ok(RunCondition::Always),
        Value::Table(condition) => {
            let variable: String = condition
                .get("variable")
                .context("Condition must have a 'variable' field")?;
            let value: String = condition
                .get("equals")
                .context("Condition must have an 'equals' field")?;
            Ok(RunCondition::VariableEquals { variable, value })
        }
        _ => anyhow::bail!("Field 'condition' must be a table"),
    }
}

fn parse_tasks(stage: &Table) -> Result<Vec<Task>> {
    let tasks_table: Table = stage
        .get("tasks")
        .context("Stage must have a 'tasks' field")?;

    let mut tasks = Vec::new();
    for entry in tasks_table.sequence_values::<Table>() {
        let task = entry.context("Failed to read task entry")?;

        let name: String = task.get("name").context("Task must have a 'name' field")?;
        let command: String = task
            .get("command")
            .context(format!("Task '{}' must have a 'command' field", name))?;

        tasks.push(Task {
            args: string_list(&task, "args")?,
            env: string_map(&task, "env")?,
            secrets: parse_secret_refs(&task)?,
            retry: parse_retry(&task).context(format!("Task '{}' has an invalid retry", name))?,
            best_effort: task.get::<Option<bool>>("best_effort")?.unwrap_or(false),
            timeout_seconds: task.get("timeout_seconds")?,
            dependency: task.get("dependency")?,
            working_dir: task.get("working_dir")?,
            name,
            command,
        });
    }

    if tasks.is_empty() {
        anyhow::bail!("Stage must have at least one task");
    }

    Ok(tasks)
}

/// Secrets may be listed as plain names or as `pipeline.secret(name)` tables
fn parse_secret_refs(task: &Table) -> Result<Vec<String>> {
    let value: Value = task.get("secrets")?;
    let list = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::Table(list) => list,
        _ => anyhow::bail!("Field 'secrets' must be an array"),
    };

    let mut secrets = Vec::new();
    for entry in list.sequence_values::<Value>() {
        match entry.context("Failed to read secret entry")? {
            Value::String(s) => secrets.push(s.to_string_lossy()),
            Value::Table(t) => secrets.push(
                t.get::<String>("secret")
                    .context("Secret reference must have a 'secret' field")?,
            ),
            _ => anyhow::bail!("Secret entries must be names or pipeline.secret() references"),
        }
    }
    Ok(secrets)
}

fn parse_retry(task: &Table) -> Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    match task.get::<Value>("retry")? {
        Value::Nil => Ok(defaults),
        Value::Table(retry) => Ok(RetryPolicy {
            max_attempts: retry
                .get::<Option<u32>>("max_attempts")?
                .unwrap_or(defaults.max_attempts),
            base_delay_ms: retry
                .get::<Option<u64>>("base_delay_ms")?
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: retry
                .get::<Option<u64>>("max_delay_ms")?
                .unwrap_or(defaults.max_delay_ms),
        }),
        _ => anyhow::bail!("Field 'retry' must be a table"),
    }
}

/// `quality_gate = { kind = "schema" | "confidence", artifact = "...", ... }`
fn parse_quality_gate(stage: &Table) -> Result<Option<QualityGateSpec>> {
    let gate = match stage.get::<Value>("quality_gate")? {
        Value::Nil => return Ok(None),
        Value::Table(gate) => gate,
        _ => anyhow::bail!("Field 'quality_gate' must be a table"),
    };

    let kind: String = gate
        .get("kind")
        .context("Quality gate must have a 'kind' field")?;
    let check = match kind.as_str() {
        "schema" => QualityCheck::Schema {
            required_fields: string_list(&gate, "required_fields")?,
        },
        "confidence" => QualityCheck::Confidence {
            field: gate
                .get::<Option<String>>("field")?
                .unwrap_or_else(|| "confidence".to_string()),
        },
        other => anyhow::bail!("Unknown quality gate kind '{}'", other),
    };

    Ok(Some(QualityGateSpec {
        check,
        artifact: gate
            .get("artifact")
            .context("Quality gate must have an 'artifact' field")?,
        threshold: gate.get("threshold")?,
        hard_floor: gate.get("hard_floor")?,
    }))
}

/// Reads an optional array of strings
fn string_list(table: &Table, field: &str) -> Result<Vec<String>> {
    match table.get::<Value>(field)? {
        Value::Nil => Ok(Vec::new()),
        Value::Table(list) => list
            .sequence_values::<String>()
            .map(|v| v.context(format!("Failed to read '{}' entry", field)))
            .collect(),
        _ => anyhow::bail!("Field '{}' must be an array of strings", field),
    }
}

/// Reads an optional string-keyed table; numbers and booleans become strings
fn string_map(table: &Table, field: &str) -> Result<BTreeMap<String, String>> {
    match table.get::<Value>(field)? {
        Value::Nil => Ok(BTreeMap::new()),
        Value::Table(map) => {
            let mut out = BTreeMap::new();
            for pair in map.pairs::<String, Value>() {
                let (key, value) = pair.context(format!("Failed to read '{}' entry", field))?;
                let text = match value {
                    Value::String(s) => s.to_string_lossy(),
                    Value::Integer(i) => i.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Boolean(b) => b.to_string(),
                    _ => anyhow::bail!("Value of '{}.{}' must be a scalar", field, key),
                };
                out.insert(key, text);
            }
            Ok(out)
        }
        _ => anyhow::bail!("Field '{}' must be a table", field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECOMMENDATION: &str = r#"
        return pipeline.define {
            name = "recommendation",
            description = "Generates recommendations from analysis output",
            trigger = pipeline.after("analysis"),
            variables = {
                recommendationEngine = "hybrid",
                confidenceThreshold = 0.75,
                batchSize = 1000,
            },
            stages = {
                pipeline.stage {
                    name = "generate",
                    quality_gate = {
                        kind = "confidence",
                        artifact = "out/recommendations.json",
                    },
                    tasks = {
                        pipeline.task {
                            name = "engine",
                            command = "python",
                            args = { "scripts/recommend.py", "--engine", "$(recommendationEngine)" },
                            secrets = { pipeline.secret("COSMOS-DB-KEY"), "OPENAI-API-KEY" },
                            retry = { max_attempts = 4, base_delay_ms = 500 },
                            timeout_seconds = 900,
                            dependency = "openai",
                        },
                    },
                },
                pipeline.stage {
                    name = "notify",
                    depends_on = { "generate" },
                    condition = { variable = "recommendationEngine", equals = "hybrid" },
                    tasks = {
                        pipeline.task { name = "send", command = "python", best_effort = true },
                    },
                },
            },
        }
    "#;

    #[test]
    fn test_parse_full_pipeline() {
        let pipeline = parse_pipeline_definition(RECOMMENDATION).unwrap();

        assert_eq!(pipeline.name, "recommendation");
        assert_eq!(
            pipeline.trigger,
            Trigger::UpstreamCompletion {
                pipeline: "analysis".to_string()
            }
        );
        assert_eq!(pipeline.variables["confidenceThreshold"], "0.75");
        assert_eq!(pipeline.variables["batchSize"], "1000");
        assert_eq!(pipeline.stages.len(), 2);

        let engine = &pipeline.stages[0].tasks[0];
        assert_eq!(engine.secrets, vec!["COSMOS-DB-KEY", "OPENAI-API-KEY"]);
        assert_eq!(engine.retry.max_attempts, 4);
        assert_eq!(engine.retry.base_delay_ms, 500);
        assert_eq!(engine.retry.max_delay_ms, RetryPolicy::default().max_delay_ms);
        assert_eq!(engine.timeout_seconds, Some(900));
        assert_eq!(engine.dependency_key(), "openai");

        let gate = pipeline.stages[0].quality_gate.as_ref().unwrap();
        assert_eq!(
            gate.check,
            QualityCheck::Confidence {
                field: "confidence".to_string()
            }
        );

        let notify = &pipeline.stages[1];
        assert_eq!(notify.depends_on, vec!["generate"]);
        assert!(notify.tasks[0].best_effort);
        assert!(matches!(notify.condition, RunCondition::VariableEquals { .. }));
    }

    #[test]
    fn test_missing_trigger_defaults_to_manual() {
        let source = r#"
            return {
                name = "adhoc",
                stages = { { name = "s", tasks = { { name = "t", command = "true" } } } },
            }
        "#;
        let pipeline = parse_pipeline_definition(source).unwrap();
        assert_eq!(pipeline.trigger, Trigger::Manual);
        assert_eq!(pipeline.stages[0].tasks[0].retry, RetryPolicy::default());
    }

    #[test]
    fn test_missing_name() {
        let source = r#"return { stages = {} }"#;
        let err = parse_pipeline_definition(source).unwrap_err();
        assert!(format!("{:#}", err).contains("name"));
    }

    #[test]
    fn test_empty_stages() {
        let source = r#"return { name = "empty", stages = {} }"#;
        let err = parse_pipeline_definition(source).unwrap_err();
        assert!(format!("{:#}", err).contains("at least one stage"));
    }

    #[test]
    fn test_unknown_trigger_kind() {
        let source = r#"
            return {
                name = "odd",
                trigger = { kind = "webhook" },
                stages = { { name = "s", tasks = { { name = "t", command = "true" } } } },
            }
        "#;
        assert!(parse_pipeline_definition(source).is_err());
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let source = r#"
            return {
                name = "nightly",
                trigger = pipeline.schedule("every night"),
                stages = { { name = "s", tasks = { { name = "t", command = "true" } } } },
            }
        "#;
        assert!(parse_pipeline_definition(source).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let definition = |threshold: &str, gate: &str| {
            format!(
                r#"
                return {{
                    name = "recommendation",
                    variables = {{ confidenceThreshold = {threshold} }},
                    stages = {{ {{
                        name = "generate",
                        quality_gate = {{ kind = "confidence", artifact = "out.json"{gate} }},
                        tasks = {{ {{ name = "t", command = "true" }} }},
                    }} }},
                }}
                "#
            )
        };

        assert!(parse_pipeline_definition(&definition("0.8", "")).is_ok());
        // percentages are not thresholds
        assert!(parse_pipeline_definition(&definition("75", "")).is_err());
        assert!(parse_pipeline_definition(&definition("0/0", "")).is_err());
        assert!(parse_pipeline_definition(&definition("\"high\"", "")).is_err());
        assert!(parse_pipeline_definition(&definition("0.6", ", hard_floor = 0.7")).is_err());
    }

    #[test]
    fn test_undeclared_secret_reference_rejected() {
        let source = r#"
            return {
                name = "leaky",
                stages = { { name = "s", tasks = {
                    { name = "t", command = "deploy", args = { "$(COSMOS-DB-KEY)" } },
                } } },
            }
        "#;
        assert!(parse_pipeline_definition(source).is_err());
    }

    #[test]
    fn test_invalid_lua() {
        assert!(parse_pipeline_definition("this is not valid lua!!!").is_err());
    }

    #[test]
    fn test_not_returning_table() {
        assert!(parse_pipeline_definition(r#"return "not a table""#).is_err());
    }
}
