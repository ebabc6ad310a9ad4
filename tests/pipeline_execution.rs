// ABOUTME: Integration tests for the pipeline orchestrator.
// ABOUTME: Runs custom stages and the full source/build/deploy release against in-memory fakes.

mod support;

use async_trait::async_trait;
use blueshift::artifact::{ArtifactContent, ArtifactStore, MemoryArtifactStore, Retention};
use blueshift::config::{Config, ReleaseSettings};
use blueshift::pipeline::{
    CancelHandle, Cancellation, ExecutionRecord, ExecutionStatus, FailureKind, Orchestrator,
    PipelineDef, PipelineError, PipelineEvent, PipelineResult, StageContext, StageDef,
    StageExecutor, StageFailure, StageOutputs, StageStatus, Trigger, release_pipeline,
};
use blueshift::policy::TrafficShiftPolicy;
use blueshift::state::{MemoryStateStore, StateStore};
use blueshift::types::{ArtifactName, ExecutionId, PipelineName, StageName};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use support::{FakeBuild, FakeSource, FakeTaskSets, Harness, ScriptedHealth, settings};
use tokio::sync::mpsc;

fn artifact(name: &str) -> ArtifactName {
    ArtifactName::new(name).unwrap()
}

fn opaque(uri: &str) -> ArtifactContent {
    ArtifactContent::Opaque {
        uri: uri.to_string(),
    }
}

/// Emits fixed outputs after checking its inputs arrived.
#[derive(Default)]
struct Emit {
    outputs: Vec<(&'static str, &'static str)>,
    requires: Vec<&'static str>,
    calls: AtomicUsize,
    cancel_after: Option<CancelHandle>,
}

impl Emit {
    fn outputs(outputs: &[(&'static str, &'static str)]) -> Self {
        Self {
            outputs: outputs.to_vec(),
            ..Self::default()
        }
    }

    fn requiring(mut self, inputs: &[&'static str]) -> Self {
        self.requires = inputs.to_vec();
        self
    }

    fn cancelling(mut self, handle: CancelHandle) -> Self {
        self.cancel_after = Some(handle);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for Emit {
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for name in &self.requires {
            ctx.input(&artifact(name))?;
        }
        if let Some(handle) = &self.cancel_after {
            handle.cancel();
        }
        Ok(self
            .outputs
            .iter()
            .map(|(name, uri)| (artifact(name), opaque(uri)))
            .collect())
    }
}

struct Fail;

#[async_trait]
impl StageExecutor for Fail {
    async fn execute(&self, _ctx: &StageContext<'_>) -> Result<StageOutputs, StageFailure> {
        Err(StageFailure::execution("tests failed"))
    }
}

fn stage(name: &str, executor: Arc<dyn StageExecutor>) -> StageDef {
    StageDef::new(StageName::new(name).unwrap(), executor)
}

struct Fixture {
    artifacts: Arc<MemoryArtifactStore>,
    state: Arc<MemoryStateStore>,
}

impl Fixture {
    fn new() -> Self {
        support::init_tracing();
        Self {
            artifacts: Arc::new(MemoryArtifactStore::new()),
            state: Arc::new(MemoryStateStore::new()),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.artifacts.clone(), self.state.clone())
    }

    async fn record(&self, id: &ExecutionId) -> ExecutionRecord {
        self.state.load_execution(id).await.unwrap().unwrap()
    }
}

fn two_stage(first: Arc<Emit>, second: Arc<dyn StageExecutor>) -> PipelineDef {
    PipelineDef::builder(PipelineName::new("web").unwrap())
        .stage(stage("build", first).output(artifact("image")))
        .stage(
            stage("deploy", second)
                .input(artifact("image"))
                .output(artifact("release")),
        )
        .build()
        .unwrap()
}

mod orchestration {
    use super::*;

    #[tokio::test]
    async fn successful_execution_keeps_only_terminal_outputs() {
        let fx = Fixture::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]));
        let deploy = Arc::new(Emit::outputs(&[("release", "deployment/1")]).requiring(&["image"]));
        let def = two_stage(build.clone(), deploy.clone());

        let result = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();

        let PipelineResult::Succeeded {
            execution_id,
            artifacts,
        } = result
        else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name(), &artifact("release"));
        assert_eq!(artifacts[0].producer(), "deploy");
        assert_eq!(fx.artifacts.len(), 1);

        let record = fx.record(&execution_id).await;
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert!(record.finished_at.is_some());
        assert!(
            record
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Succeeded)
        );
        assert_eq!(build.calls(), 1);
        assert_eq!(deploy.calls(), 1);
    }

    #[tokio::test]
    async fn keep_all_retention_releases_nothing() {
        let fx = Fixture::new();
        let def = two_stage(
            Arc::new(Emit::outputs(&[("image", "registry/app:v1")])),
            Arc::new(Emit::outputs(&[("release", "deployment/1")])),
        );

        fx.orchestrator()
            .with_retention(Retention::KeepAll)
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(fx.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn missing_declared_output_fails_the_stage() {
        let fx = Fixture::new();
        let def = two_stage(
            Arc::new(Emit::default()),
            Arc::new(Emit::outputs(&[("release", "deployment/1")])),
        );

        let result = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();

        let PipelineResult::Failed { stage, cause, kind, .. } = &result else {
            panic!("expected failure, got {result:?}");
        };
        assert_eq!(stage.as_str(), "build");
        assert_eq!(*kind, FailureKind::StageExecution);
        assert!(cause.contains("image"), "{cause}");
    }

    #[tokio::test]
    async fn undeclared_output_fails_the_stage() {
        let fx = Fixture::new();
        let def = two_stage(
            Arc::new(Emit::outputs(&[("image", "a"), ("extra", "b")])),
            Arc::new(Emit::outputs(&[("release", "deployment/1")])),
        );

        let result = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::StageExecution));
        assert!(fx.artifacts.is_empty());
    }

    #[tokio::test]
    async fn failure_skips_later_stages_and_releases_artifacts() {
        let fx = Fixture::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]));
        let def = PipelineDef::builder(PipelineName::new("web").unwrap())
            .stage(stage("build", build).output(artifact("image")))
            .stage(stage("test", Arc::new(Fail)).input(artifact("image")))
            .stage(stage("deploy", Arc::new(Emit::default())).input(artifact("image")))
            .build()
            .unwrap();

        let result = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();
        assert!(!result.is_success());

        let record = fx.record(result.execution_id()).await;
        let statuses: Vec<_> = record.stages.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StageStatus::Succeeded, StageStatus::Failed, StageStatus::Skipped]
        );
        assert_eq!(record.status, ExecutionStatus::Failed);
        let failure = record.failure.unwrap();
        assert_eq!(failure.stage.as_str(), "test");
        assert_eq!(failure.cause, "tests failed");
        assert!(record.artifacts.is_empty());
        assert!(fx.artifacts.is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_stages() {
        let fx = Fixture::new();
        let handle = CancelHandle::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]).cancelling(handle.clone()));
        let deploy = Arc::new(Emit::outputs(&[("release", "deployment/1")]));
        let def = two_stage(build.clone(), deploy.clone());

        let result = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &handle.token())
            .await
            .unwrap();

        assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(build.calls(), 1);
        assert_eq!(deploy.calls(), 0);

        let record = fx.record(result.execution_id()).await;
        assert_eq!(record.status, ExecutionStatus::Cancelled);
        assert_eq!(record.stages[1].status, StageStatus::Skipped);
        assert!(fx.artifacts.is_empty());
    }

    #[tokio::test]
    async fn trigger_artifacts_feed_the_first_stage() {
        let fx = Fixture::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]).requiring(&["source"]));
        let def = PipelineDef::builder(PipelineName::new("web").unwrap())
            .trigger_artifact(artifact("source"))
            .stage(
                stage("build", build)
                    .input(artifact("source"))
                    .output(artifact("image")),
            )
            .build()
            .unwrap();

        let err = fx
            .orchestrator()
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingTriggerArtifact(_)));

        let trigger = Trigger::new("webhook").with_artifact(
            artifact("source"),
            ArtifactContent::Source {
                commit_id: "abc".to_string(),
                content_ref: "s3://bucket/abc.zip".to_string(),
            },
        );
        let result = fx
            .orchestrator()
            .execute(&def, trigger, &Cancellation::never())
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn events_follow_stage_progress() {
        let fx = Fixture::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let def = two_stage(
            Arc::new(Emit::outputs(&[("image", "registry/app:v1")])),
            Arc::new(Fail),
        );

        let orchestrator = fx.orchestrator().with_events(tx);
        orchestrator
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();
        drop(orchestrator);

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(match event {
                PipelineEvent::ExecutionStarted { .. } => "execution_started",
                PipelineEvent::StageStarted { .. } => "stage_started",
                PipelineEvent::StageSucceeded { .. } => "stage_succeeded",
                PipelineEvent::StageFailed { .. } => "stage_failed",
                PipelineEvent::ExecutionFinished { status, .. } => {
                    assert_eq!(status, ExecutionStatus::Failed);
                    "execution_finished"
                }
            });
        }
        assert_eq!(
            names,
            vec![
                "execution_started",
                "stage_started",
                "stage_succeeded",
                "stage_started",
                "stage_failed",
                "execution_finished",
            ]
        );
    }

    #[tokio::test]
    async fn execute_all_runs_independent_executions() {
        let fx = Fixture::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]));
        let def = two_stage(
            build.clone(),
            Arc::new(Emit::outputs(&[("release", "deployment/1")])),
        );

        let results = fx
            .orchestrator()
            .execute_all(
                &def,
                vec![Trigger::new("a"), Trigger::new("b"), Trigger::new("c")],
                &Cancellation::never(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.is_success())));
        assert_eq!(build.calls(), 3);
        assert_eq!(fx.state.list_executions().await.unwrap().len(), 3);
        assert_eq!(fx.artifacts.len(), 3);
    }
}

mod resume {
    use super::*;

    #[tokio::test]
    async fn resume_skips_succeeded_stages() {
        let fx = Fixture::new();
        let build = Arc::new(Emit::outputs(&[("image", "registry/app:v1")]));
        let deploy = Arc::new(Emit::outputs(&[("release", "deployment/1")]).requiring(&["image"]));
        let def = two_stage(build.clone(), deploy.clone());

        // An execution interrupted after its build stage.
        let image = fx
            .artifacts
            .put("build", artifact("image"), opaque("registry/app:v1"))
            .unwrap();
        let mut record = ExecutionRecord::new(
            ExecutionId::new("interrupted"),
            &def,
            Trigger::new("push").info(),
        );
        record.stages[0].status = StageStatus::Succeeded;
        record.stages[0].outputs = vec![image.id().clone()];
        record.stages[1].status = StageStatus::Running;
        record.cursor = 1;
        record.artifacts.insert(artifact("image"), image.id().clone());
        fx.state.save_execution(&record).await.unwrap();

        let result = fx
            .orchestrator()
            .resume(&def, &record.id, &Cancellation::never())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(build.calls(), 0);
        assert_eq!(deploy.calls(), 1);
        assert_eq!(fx.record(&record.id).await.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn finished_executions_cannot_resume() {
        let fx = Fixture::new();
        let def = two_stage(
            Arc::new(Emit::outputs(&[("image", "registry/app:v1")])),
            Arc::new(Fail),
        );
        let orchestrator = fx.orchestrator();
        let result = orchestrator
            .execute(&def, Trigger::new("push"), &Cancellation::never())
            .await
            .unwrap();

        let err = orchestrator
            .resume(&def, result.execution_id(), &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NotResumable {
                status: ExecutionStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let fx = Fixture::new();
        let def = two_stage(Arc::new(Emit::default()), Arc::new(Fail));
        let err = fx
            .orchestrator()
            .resume(&def, &ExecutionId::new("nope"), &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn resume_rejects_a_different_pipeline() {
        let fx = Fixture::new();
        let def = two_stage(Arc::new(Emit::default()), Arc::new(Fail));
        let record = ExecutionRecord::new(ExecutionId::new("e-1"), &def, Trigger::new("x").info());
        fx.state.save_execution(&record).await.unwrap();

        let other = PipelineDef::builder(PipelineName::new("web").unwrap())
            .stage(stage("only", Arc::new(Emit::default())))
            .build()
            .unwrap();
        let err = fx
            .orchestrator()
            .resume(&other, &record.id, &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DefinitionMismatch(_)));
    }
}

mod release {
    use super::*;

    const CONFIG: &str = r#"
pipeline: web
source:
  repo: git@example.com:acme/web.git
  command: ./checkout.sh
build:
  image_repository: registry.test/app
  command: ./build.sh
deploy:
  container_port: 8080
  task_role: task-role
health:
  command: ./health.sh
target:
  name: test-cluster
  create: ./create.sh
  weights: ./weights.sh
  destroy: ./destroy.sh
"#;

    fn release_settings() -> ReleaseSettings {
        Config::from_yaml(CONFIG)
            .unwrap()
            .resolve(Path::new("/srv/web"))
            .unwrap()
    }

    struct Release {
        harness: Harness,
        source: Arc<FakeSource>,
        build: Arc<FakeBuild>,
        artifacts: Arc<MemoryArtifactStore>,
        def: PipelineDef,
        orchestrator: Orchestrator,
    }

    fn release(harness: Harness, source: Arc<FakeSource>, build: Arc<FakeBuild>) -> Release {
        let controller = Arc::new(harness.controller(settings(TrafficShiftPolicy::all_at_once())));
        let collaborators = harness.collaborators(source.clone(), build.clone());
        let def = release_pipeline(&release_settings(), &collaborators, controller).unwrap();
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let orchestrator = Orchestrator::new(artifacts.clone(), harness.store.clone())
            .with_diagnostics(harness.diagnostics.clone());
        Release {
            harness,
            source,
            build,
            artifacts,
            def,
            orchestrator,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn release_deploys_the_built_image() {
        let r = release(Harness::healthy(), FakeSource::ok(), FakeBuild::ok());

        let result = r
            .orchestrator
            .execute(
                &r.def,
                Trigger::new("manual").with_revision("abc123"),
                &Cancellation::never(),
            )
            .await
            .unwrap();

        let PipelineResult::Succeeded { artifacts, .. } = &result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name(), &artifact("release"));
        assert_eq!(r.artifacts.len(), 1);

        assert_eq!(r.source.revisions(), vec![Some("abc123".to_string())]);
        assert_eq!(r.build.builds(), 1);
        let created = r.harness.task_sets.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].image.tag(), Some("abc123"));
        assert_eq!(r.harness.task_sets.green_weights(), vec![100]);

        let deployments = r.harness.store.list_deployments().await.unwrap();
        assert_eq!(deployments.len(), 1);
        assert_eq!(
            deployments[0].execution_id.as_ref(),
            Some(result.execution_id())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_release_fails_as_rolled_back() {
        let task_sets = FakeTaskSets::with_primary();
        let health = ScriptedHealth::unhealthy_from(task_sets.clone(), 100);
        let r = release(Harness::new(task_sets, health), FakeSource::ok(), FakeBuild::ok());

        let result = r
            .orchestrator
            .execute(&r.def, Trigger::new("manual"), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(result.failure_kind(), Some(FailureKind::DeploymentRolledBack));
        assert!(r.harness.task_sets.is_live("blue-1"));
        assert_eq!(r.harness.task_sets.green_weights(), vec![100, 0]);
        assert!(r.artifacts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn build_failure_never_deploys() {
        let r = release(Harness::healthy(), FakeSource::ok(), FakeBuild::failing());

        let result = r
            .orchestrator
            .execute(&r.def, Trigger::new("manual"), &Cancellation::never())
            .await
            .unwrap();

        let PipelineResult::Failed { stage, kind, cause, .. } = &result else {
            panic!("expected failure, got {result:?}");
        };
        assert_eq!(stage.as_str(), "build");
        assert_eq!(*kind, FailureKind::StageExecution);
        assert!(cause.contains("E0425"), "{cause}");
        assert!(r.harness.task_sets.created().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_stops_the_release() {
        let r = release(Harness::healthy(), FakeSource::failing(), FakeBuild::ok());

        let result = r
            .orchestrator
            .execute(&r.def, Trigger::new("manual"), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(result.failure_kind(), Some(FailureKind::StageExecution));
        assert_eq!(r.build.builds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_release_resumes_without_rebuilding() {
        let r = release(Harness::healthy(), FakeSource::ok(), FakeBuild::ok());
        r.harness.task_sets.fail_destroy(u32::MAX);

        let result = r
            .orchestrator
            .execute(&r.def, Trigger::new("manual"), &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::DeploymentStuck));

        let id = result.execution_id().clone();
        let record = r.harness.store.load_execution(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Stuck);
        assert!(record.artifacts.contains_key(&artifact("image")));

        r.harness.task_sets.fail_destroy(0);
        let resumed = r
            .orchestrator
            .resume(&r.def, &id, &Cancellation::never())
            .await
            .unwrap();

        assert!(resumed.is_success());
        assert_eq!(r.build.builds(), 1);
        assert_eq!(r.harness.task_sets.created().len(), 1);
        assert!(!r.harness.task_sets.is_live("blue-1"));
        assert_eq!(r.harness.store.list_deployments().await.unwrap().len(), 1);
    }
}
