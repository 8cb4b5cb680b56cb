mod common;

use common::{ScriptedRunner, all_secrets, engine, pipeline, stage, task, wait_for_pipeline};
use sluice_core::domain::pipeline::{QualityCheck, QualityGateSpec, Trigger};
use sluice_core::domain::quality::QualityVerdict;
use sluice_core::domain::run::{RunStatus, StageStatus};
use sluice_core::dto::event::TriggerOutcome;
use sluice_core::error::ErrorKind;
use sluice_core::graph::PipelineGraph;
use sluice_orchestrator::runner::Termination;
use sluice_orchestrator::secrets::StaticSecretProvider;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Data Collection -> Analysis -> Recommendation, Main CI on its own
fn platform(artifact_dir: &Path) -> PipelineGraph {
    let mut collect = task("collect", "collect");
    collect.secrets = vec!["COSMOS-DB-KEY".to_string()];

    let mut analyze = task("analyze", "analyze");
    analyze.secrets = vec!["OPENAI-API-KEY".to_string()];
    analyze.dependency = Some("openai".to_string());

    let mut generate = stage("generate", &[], vec![task("engine", "engine")]);
    generate.quality_gate = Some(QualityGateSpec {
        check: QualityCheck::Confidence {
            field: "confidence".to_string(),
        },
        artifact: "$(outDir)/recommendations.json".to_string(),
        threshold: None,
        hard_floor: None,
    });

    let mut recommendation = pipeline(
        "recommendation",
        Trigger::UpstreamCompletion {
            pipeline: "analysis".to_string(),
        },
        vec![
            generate,
            stage("publish", &["generate"], vec![task("publish", "publish")]),
        ],
    );
    recommendation
        .variables
        .insert("outDir".to_string(), artifact_dir.display().to_string());
    recommendation
        .variables
        .insert("confidenceThreshold".to_string(), "0.75".to_string());

    PipelineGraph::build(vec![
        pipeline(
            "data-collection",
            Trigger::Scheduled {
                cron: "0 2 * * *".to_string(),
            },
            vec![stage("collect", &[], vec![collect])],
        ),
        pipeline(
            "analysis",
            Trigger::UpstreamCompletion {
                pipeline: "data-collection".to_string(),
            },
            vec![stage("analyze", &[], vec![analyze])],
        ),
        recommendation,
        pipeline(
            "main-ci",
            Trigger::BranchPush {
                branch: "main".to_string(),
            },
            vec![stage("build", &[], vec![task("build", "cargo")])],
        ),
    ])
    .unwrap()
}

fn write_recommendations(dir: &Path, confidence: f64) {
    let records = format!(
        r#"[{{"item": "a", "confidence": {c}}}, {{"item": "b", "confidence": {c}}}]"#,
        c = confidence
    );
    std::fs::write(dir.join("recommendations.json"), records).unwrap();
}

#[tokio::test]
async fn test_collection_analysis_recommendation_chain() {
    let dir = tempfile::tempdir().unwrap();
    write_recommendations(dir.path(), 0.9);

    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner.clone(), all_secrets());
    engine.start();

    engine
        .trigger("data-collection", BTreeMap::new())
        .await
        .unwrap();

    let recommendation = wait_for_pipeline(&engine, "recommendation").await;
    assert_eq!(recommendation.status, RunStatus::Succeeded);
    assert_eq!(recommendation.quality.len(), 1);
    assert_eq!(recommendation.quality[0].verdict, QualityVerdict::Pass);

    for name in ["data-collection", "analysis"] {
        let run = engine.latest_run(name).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded, "{} did not succeed", name);
    }
    assert!(engine.list_runs("main-ci").await.unwrap().is_empty());
    assert_eq!(runner.programs(), vec!["collect", "analyze", "engine", "publish"]);

    engine.shutdown();
}

#[tokio::test]
async fn test_failed_upstream_never_triggers_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().script("collect", vec![Termination::Exited(1)]));
    let engine = engine(platform(dir.path()), runner.clone(), all_secrets());
    engine.start();

    engine
        .trigger("data-collection", BTreeMap::new())
        .await
        .unwrap();
    let collection = wait_for_pipeline(&engine, "data-collection").await;
    assert_eq!(collection.status, RunStatus::Failed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.list_runs("analysis").await.unwrap().is_empty());
    assert_eq!(
        engine.latest_run_status("data-collection").await.unwrap(),
        Some(RunStatus::Failed)
    );

    engine.shutdown();
}

#[tokio::test]
async fn test_manual_trigger_bypasses_upstream_gate() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner.clone(), all_secrets());

    let outcome = engine.trigger("analysis", BTreeMap::new()).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Started { .. }));

    let analysis = wait_for_pipeline(&engine, "analysis").await;
    assert_eq!(analysis.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_missing_secret_fails_before_any_task() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let secrets = StaticSecretProvider::new().with("OPENAI-API-KEY", "sk-secret");
    let engine = engine(platform(dir.path()), runner.clone(), secrets);

    engine
        .trigger("data-collection", BTreeMap::new())
        .await
        .unwrap();
    let run = wait_for_pipeline(&engine, "data-collection").await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code(), 3);
    assert_eq!(run.executed_task_count(), 0);
    assert_eq!(run.failure.unwrap().kind, ErrorKind::SecretUnavailable);
    assert!(runner.programs().is_empty());
}

#[tokio::test]
async fn test_quality_warning_lets_run_continue() {
    let dir = tempfile::tempdir().unwrap();
    write_recommendations(dir.path(), 0.6);
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner.clone(), all_secrets());

    engine
        .trigger("recommendation", BTreeMap::new())
        .await
        .unwrap();
    let run = wait_for_pipeline(&engine, "recommendation").await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.quality[0].verdict, QualityVerdict::Warning);
    assert_eq!(run.stage("generate").unwrap().warnings.len(), 1);
    assert_eq!(run.stage("publish").unwrap().status, StageStatus::Succeeded);
}

#[tokio::test]
async fn test_quality_below_floor_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    write_recommendations(dir.path(), 0.3);
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner.clone(), all_secrets());

    engine
        .trigger("recommendation", BTreeMap::new())
        .await
        .unwrap();
    let run = wait_for_pipeline(&engine, "recommendation").await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code(), 1);
    assert_eq!(run.failure.as_ref().unwrap().kind, ErrorKind::DataQualityFailure);
    assert_eq!(run.stage("publish").unwrap().status, StageStatus::Cancelled);
    assert!(!runner.programs().contains(&"publish".to_string()));
}

#[tokio::test]
async fn test_threshold_override_per_run() {
    let dir = tempfile::tempdir().unwrap();
    write_recommendations(dir.path(), 0.6);
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner, all_secrets());

    let mut overrides = BTreeMap::new();
    overrides.insert("confidenceThreshold".to_string(), "0.6".to_string());
    engine.trigger("recommendation", overrides).await.unwrap();
    let run = wait_for_pipeline(&engine, "recommendation").await;

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.quality[0].verdict, QualityVerdict::Pass);
    assert_eq!(run.variables["confidenceThreshold"], "0.6");
}

#[tokio::test]
async fn test_rerun_produces_same_record_shape() {
    let dir = tempfile::tempdir().unwrap();
    write_recommendations(dir.path(), 0.9);
    let runner = Arc::new(ScriptedRunner::new());
    let engine = engine(platform(dir.path()), runner, all_secrets());

    let mut runs = Vec::new();
    for _ in 0..2 {
        let run_id = match engine
            .trigger("recommendation", BTreeMap::new())
            .await
            .unwrap()
        {
            TriggerOutcome::Started { run_id } | TriggerOutcome::Queued { run_id, .. } => run_id,
            TriggerOutcome::Skipped { reason, .. } => panic!("run skipped: {}", reason),
        };
        runs.push(common::wait_for_run(&engine, run_id).await);
    }

    let shape = |run: &sluice_core::domain::run::Run| {
        run.stages
            .iter()
            .map(|s| (s.name.clone(), s.status, s.tasks.len()))
            .collect::<Vec<_>>()
    };
    assert_ne!(runs[0].id, runs[1].id);
    assert_eq!(shape(&runs[0]), shape(&runs[1]));
    assert_eq!(runs[0].quality[0].score, runs[1].quality[0].score);
}
