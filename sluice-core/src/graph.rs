//! Pipeline dependency graph
//!
//! Built once at configuration load. Construction rejects duplicate names,
//! unknown upstream references, dependency cycles and malformed stage graphs,
//! so a constructed [`PipelineGraph`] is always a valid DAG.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::domain::pipeline::{Pipeline, Trigger};
use crate::domain::quality::{THRESHOLD_VARIABLE, parse_threshold};
use crate::error::SluiceError;
use crate::template;

/// Validated DAG of pipelines
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pipelines: BTreeMap<String, Pipeline>,
    upstream: BTreeMap<String, Vec<String>>,
    order: Vec<String>,
}

impl PipelineGraph {
    /// Validates the pipelines and builds the graph
    pub fn build(pipelines: Vec<Pipeline>) -> Result<Self, SluiceError> {
        let mut by_name = BTreeMap::new();
        for pipeline in pipelines {
            validate_pipeline(&pipeline)?;
            if by_name.contains_key(&pipeline.name) {
                return Err(SluiceError::DuplicatePipeline(pipeline.name));
            }
            by_name.insert(pipeline.name.clone(), pipeline);
        }

        let mut upstream = BTreeMap::new();
        for (name, pipeline) in &by_name {
            let deps = effective_upstream(pipeline);
            for dep in &deps {
                if !by_name.contains_key(dep) {
                    return Err(SluiceError::UnknownUpstream {
                        pipeline: name.clone(),
                        upstream: dep.clone(),
                    });
                }
            }
            upstream.insert(name.clone(), deps);
        }

        let order = topological_sort(&upstream).map_err(SluiceError::PipelineCycle)?;

        Ok(Self {
            pipelines: by_name,
            upstream,
            order,
        })
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Pipelines that must have succeeded before `name` may start
    pub fn upstream_of(&self, name: &str) -> &[String] {
        self.upstream.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pipelines directly gated on `name`
    pub fn downstream_of(&self, name: &str) -> Vec<&str> {
        self.upstream
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == name))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Pipeline names ordered so that every pipeline follows its upstreams
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Declared upstreams plus the pipeline named by an upstream-completion trigger
fn effective_upstream(pipeline: &Pipeline) -> Vec<String> {
    let mut deps = pipeline.upstream.clone();
    if let Trigger::UpstreamCompletion { pipeline: up } = &pipeline.trigger {
        if !deps.contains(up) {
            deps.push(up.clone());
        }
    }
    deps
}

/// Kahn's algorithm over a name -> dependencies map
///
/// Returns the names left over in a cycle as the error value.
fn topological_sort(deps: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, String> {
    let deps: BTreeMap<&str, BTreeSet<&str>> = deps
        .iter()
        .map(|(name, d)| (name.as_str(), d.iter().map(String::as_str).collect()))
        .collect();

    let mut in_degree: HashMap<&str, usize> =
        deps.iter().map(|(name, d)| (*name, d.len())).collect();

    let mut queue: VecDeque<&str> = deps
        .iter()
        .filter(|(_, d)| d.is_empty())
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(deps.len());
    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        for (dependent, d) in &deps {
            if d.contains(name) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
    }

    if order.len() != deps.len() {
        let stuck: BTreeSet<&str> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(n, _)| n)
            .collect();
        return Err(stuck.into_iter().collect::<Vec<_>>().join(", "));
    }

    Ok(order)
}

/// Checks the structure of a single pipeline
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<(), SluiceError> {
    let invalid = |message: String| SluiceError::InvalidStages {
        pipeline: pipeline.name.clone(),
        message,
    };

    if pipeline.name.trim().is_empty() {
        return Err(invalid("pipeline name cannot be empty".to_string()));
    }
    if pipeline.stages.is_empty() {
        return Err(invalid("pipeline must have at least one stage".to_string()));
    }
    if pipeline.upstream.iter().any(|u| u == &pipeline.name) {
        return Err(SluiceError::PipelineCycle(pipeline.name.clone()));
    }

    match &pipeline.trigger {
        Trigger::Scheduled { cron } => {
            crate::schedule::validate_cron(&pipeline.name, cron)?;
        }
        Trigger::BranchPush { branch } if branch.trim().is_empty() => {
            return Err(SluiceError::InvalidTrigger {
                pipeline: pipeline.name.clone(),
                message: "branch cannot be empty".to_string(),
            });
        }
        Trigger::UpstreamCompletion { pipeline: up } if up == &pipeline.name => {
            return Err(SluiceError::PipelineCycle(pipeline.name.clone()));
        }
        _ => {}
    }

    if let Some(raw) = pipeline.variables.get(THRESHOLD_VARIABLE) {
        parse_threshold(raw)?;
    }

    let mut stage_deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for stage in &pipeline.stages {
        if stage_deps.contains_key(&stage.name) {
            return Err(invalid(format!("duplicate stage '{}'", stage.name)));
        }
        if stage.tasks.is_empty() {
            return Err(invalid(format!("stage '{}' has no tasks", stage.name)));
        }

        let mut task_names = BTreeSet::new();
        for task in &stage.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(invalid(format!(
                    "duplicate task '{}' in stage '{}'",
                    task.name, stage.name
                )));
            }
            if task.retry.max_attempts == 0 {
                return Err(invalid(format!(
                    "task '{}' must allow at least one attempt",
                    task.name
                )));
            }
            validate_task_templates(pipeline, &stage.name, task)?;
        }

        if let Some(gate) = &stage.quality_gate {
            // The orchestrator floor is unknown here; only the gate's own is checked
            gate.thresholds(&pipeline.variables, gate.hard_floor.unwrap_or(0.0))?;
        }

        stage_deps.insert(stage.name.clone(), stage.depends_on.clone());
    }

    for (name, deps) in &stage_deps {
        for dep in deps {
            if dep == name {
                return Err(invalid(format!("stage '{}' depends on itself", name)));
            }
            if !stage_deps.contains_key(dep) {
                return Err(invalid(format!(
                    "stage '{}' depends on unknown stage '{}'",
                    name, dep
                )));
            }
        }
    }

    topological_sort(&stage_deps)
        .map_err(|stuck| invalid(format!("stage dependency cycle involving: {}", stuck)))?;

    Ok(())
}

/// Every `$(name)` must be a pipeline variable or a secret declared by the task
fn validate_task_templates(
    pipeline: &Pipeline,
    stage: &str,
    task: &crate::domain::pipeline::Task,
) -> Result<(), SluiceError> {
    let templates = std::iter::once(&task.command)
        .chain(task.args.iter())
        .chain(task.env.values())
        .chain(task.working_dir.iter());

    for text in templates {
        for name in template::references(text)? {
            let known = pipeline.variables.contains_key(&name) || task.secrets.contains(&name);
            if !known {
                return Err(SluiceError::InvalidStages {
                    pipeline: pipeline.name.clone(),
                    message: format!(
                        "task '{}' in stage '{}' references undefined '{}'",
                        task.name, stage, name
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::{RetryPolicy, RunCondition, Stage, Task};

    fn task(name: &str) -> Task {
        Task {
            name: name.to_string(),
            command: "python".to_string(),
            args: vec![],
            env: BTreeMap::new(),
            secrets: vec![],
            retry: RetryPolicy::once(),
            best_effort: false,
            timeout_seconds: None,
            dependency: None,
            working_dir: None,
        }
    }

    fn stage(name: &str, deps: &[&str]) -> Stage {
        Stage {
            name: name.to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            condition: RunCondition::Always,
            tasks: vec![task("run")],
            quality_gate: None,
        }
    }

    fn pipeline(name: &str, trigger: Trigger, upstream: &[&str]) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            description: None,
            trigger,
            upstream: upstream.iter().map(|u| u.to_string()).collect(),
            variables: BTreeMap::new(),
            stages: vec![stage("main", &[])],
        }
    }

    fn documented_pipelines() -> Vec<Pipeline> {
        vec![
            pipeline(
                "recommendation",
                Trigger::UpstreamCompletion {
                    pipeline: "analysis".to_string(),
                },
                &[],
            ),
            pipeline(
                "data-collection",
                Trigger::Scheduled {
                    cron: "0 0 2 * * *".to_string(),
                },
                &[],
            ),
            pipeline(
                "analysis",
                Trigger::UpstreamCompletion {
                    pipeline: "data-collection".to_string(),
                },
                &["data-collection"],
            ),
            pipeline(
                "main-ci",
                Trigger::BranchPush {
                    branch: "main".to_string(),
                },
                &[],
            ),
        ]
    }

    #[test]
    fn test_documented_order() {
        let graph = PipelineGraph::build(documented_pipelines()).unwrap();
        let order = graph.topological_order();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();

        assert!(pos("data-collection") < pos("analysis"));
        assert!(pos("analysis") < pos("recommendation"));
        assert_eq!(graph.upstream_of("recommendation"), &["analysis".to_string()]);
        assert_eq!(graph.downstream_of("data-collection"), vec!["analysis"]);
        assert!(graph.downstream_of("main-ci").is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        let pipelines = vec![
            pipeline("a", Trigger::Manual, &["c"]),
            pipeline("b", Trigger::Manual, &["a"]),
            pipeline("c", Trigger::Manual, &["b"]),
        ];
        let err = PipelineGraph::build(pipelines).unwrap_err();
        assert!(matches!(err, SluiceError::PipelineCycle(_)));
    }

    #[test]
    fn test_unknown_upstream_rejected() {
        let pipelines = vec![pipeline("a", Trigger::Manual, &["ghost"])];
        let err = PipelineGraph::build(pipelines).unwrap_err();
        assert!(matches!(err, SluiceError::UnknownUpstream { .. }));
    }

    #[test]
    fn test_duplicate_pipeline_rejected() {
        let pipelines = vec![
            pipeline("a", Trigger::Manual, &[]),
            pipeline("a", Trigger::Manual, &[]),
        ];
        assert!(matches!(
            PipelineGraph::build(pipelines),
            Err(SluiceError::DuplicatePipeline(_))
        ));
    }

    #[test]
    fn test_stage_cycle_rejected() {
        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.stages = vec![stage("x", &["y"]), stage("y", &["x"])];
        assert!(matches!(
            validate_pipeline(&p),
            Err(SluiceError::InvalidStages { .. })
        ));
    }

    #[test]
    fn test_unknown_stage_dependency_rejected() {
        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.stages = vec![stage("x", &["missing"])];
        let err = validate_pipeline(&p).unwrap_err();
        assert!(err.to_string().contains("unknown stage"));
    }

    #[test]
    fn test_undefined_template_reference_rejected() {
        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.stages[0].tasks[0].args = vec!["--key=$(COSMOS-DB-KEY)".to_string()];
        assert!(validate_pipeline(&p).is_err());

        p.stages[0].tasks[0].secrets = vec!["COSMOS-DB-KEY".to_string()];
        assert!(validate_pipeline(&p).is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.stages[0].tasks[0].retry.max_attempts = 0;
        assert!(validate_pipeline(&p).is_err());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        use crate::domain::pipeline::{QualityCheck, QualityGateSpec};

        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.variables
            .insert(THRESHOLD_VARIABLE.to_string(), "NaN".to_string());
        assert!(matches!(
            validate_pipeline(&p),
            Err(SluiceError::InvalidThreshold { .. })
        ));

        let mut p = pipeline("a", Trigger::Manual, &[]);
        p.stages[0].quality_gate = Some(QualityGateSpec {
            check: QualityCheck::Confidence {
                field: "confidence".to_string(),
            },
            artifact: "out.json".to_string(),
            threshold: Some(0.6),
            hard_floor: Some(0.7),
        });
        assert!(validate_pipeline(&p).is_err());

        p.stages[0].quality_gate.as_mut().unwrap().hard_floor = Some(0.5);
        assert!(validate_pipeline(&p).is_ok());
    }
}
