// ABOUTME: Test support utilities.
// ABOUTME: Deterministic fakes for every collaborator plus a shared tracing initializer.

#![allow(dead_code)]

use async_trait::async_trait;
use blueshift::deploy::{BlueGreenController, DeploySettings};
use blueshift::diagnostics::Diagnostics;
use blueshift::ops::{
    BuildError, BuildOps, Collaborators, ExecutionTarget, HealthCheck, HealthError, HealthStatus,
    PrimaryTaskSet, SourceArtifact, SourceError, SourceOps, TaskSetError, TaskSetOps, TaskSetSpec,
};
use blueshift::policy::TrafficShiftPolicy;
use blueshift::state::MemoryStateStore;
use blueshift::types::{ImageRef, TaskSetId, TrafficSplit, Weight};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::Instant;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("blueshift=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn target() -> ExecutionTarget {
    ExecutionTarget::new("test-cluster").with_attribute("region", "eu-west-1")
}

pub fn image(tag: &str) -> ImageRef {
    ImageRef::parse(&format!("registry.test/app:{}", tag)).unwrap()
}

/// Settings with short, round numbers so paused-clock tests are easy to read.
pub fn settings(policy: TrafficShiftPolicy) -> DeploySettings {
    let mut settings = DeploySettings::new(policy, 8080, "task-role");
    settings.health.interval = Duration::from_secs(10);
    settings.health.timeout = Duration::from_secs(5);
    settings.health.startup_timeout = Duration::from_secs(300);
    settings
}

/// One `apply_weights` call as seen by the target.
#[derive(Debug, Clone)]
pub struct WeightCall {
    pub at: Instant,
    pub blue: Option<TaskSetId>,
    pub green: TaskSetId,
    pub split: TrafficSplit,
}

#[derive(Debug, Default)]
struct TaskSetState {
    primary: Option<PrimaryTaskSet>,
    live: HashSet<TaskSetId>,
    next_id: u32,
    created: Vec<TaskSetSpec>,
    weight_calls: Vec<WeightCall>,
    destroyed: Vec<TaskSetId>,
    destroyed_at: Vec<Instant>,
    green_weight: Weight,
    fail_create: bool,
    fail_weights: bool,
    destroy_failures: u32,
}

/// In-memory execution target.
#[derive(Debug, Default)]
pub struct FakeTaskSets {
    state: Mutex<TaskSetState>,
}

impl FakeTaskSets {
    /// A target with nothing running yet.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A target where `blue-1` runs `app:v1` and carries all traffic.
    pub fn with_primary() -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock();
            let id = TaskSetId::new("blue-1");
            state.live.insert(id.clone());
            state.primary = Some(PrimaryTaskSet {
                id,
                image: image("v1"),
            });
        }
        Arc::new(fake)
    }

    pub fn fail_create(&self) {
        self.state.lock().fail_create = true;
    }

    pub fn fail_weights(&self, fail: bool) {
        self.state.lock().fail_weights = fail;
    }

    /// Make the next `count` destroy calls fail with an unreachable target.
    pub fn fail_destroy(&self, count: u32) {
        self.state.lock().destroy_failures = count;
    }

    /// Green weights in the order they were applied.
    pub fn green_weights(&self) -> Vec<u8> {
        self.state
            .lock()
            .weight_calls
            .iter()
            .map(|c| c.split.green().get())
            .collect()
    }

    pub fn weight_calls(&self) -> Vec<WeightCall> {
        self.state.lock().weight_calls.clone()
    }

    pub fn current_green_weight(&self) -> Weight {
        self.state.lock().green_weight
    }

    pub fn created(&self) -> Vec<TaskSetSpec> {
        self.state.lock().created.clone()
    }

    pub fn destroyed(&self) -> Vec<TaskSetId> {
        self.state.lock().destroyed.clone()
    }

    /// When `id` was destroyed, on the test clock.
    pub fn destroyed_at(&self, id: &str) -> Option<Instant> {
        let state = self.state.lock();
        let index = state.destroyed.iter().position(|d| d.as_str() == id)?;
        state.destroyed_at.get(index).copied()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.state.lock().live.contains(&TaskSetId::new(id))
    }
}

#[async_trait]
impl TaskSetOps for FakeTaskSets {
    async fn primary_task_set(
        &self,
        _target: &ExecutionTarget,
    ) -> Result<Option<PrimaryTaskSet>, TaskSetError> {
        Ok(self.state.lock().primary.clone())
    }

    async fn create_task_set(
        &self,
        _target: &ExecutionTarget,
        spec: &TaskSetSpec,
    ) -> Result<TaskSetId, TaskSetError> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(TaskSetError::CreateFailed("capacity exhausted".to_string()));
        }
        state.next_id += 1;
        let id = TaskSetId::new(format!("green-{}", state.next_id));
        state.live.insert(id.clone());
        state.created.push(spec.clone());
        state.green_weight = Weight::ZERO;
        Ok(id)
    }

    async fn apply_weights(
        &self,
        _target: &ExecutionTarget,
        blue: Option<&TaskSetId>,
        green: &TaskSetId,
        split: TrafficSplit,
    ) -> Result<(), TaskSetError> {
        let mut state = self.state.lock();
        if state.fail_weights {
            return Err(TaskSetError::Rejected("listener busy".to_string()));
        }
        state.weight_calls.push(WeightCall {
            at: Instant::now(),
            blue: blue.cloned(),
            green: green.clone(),
            split,
        });
        state.green_weight = split.green();
        Ok(())
    }

    async fn destroy_task_set(
        &self,
        _target: &ExecutionTarget,
        id: &TaskSetId,
    ) -> Result<(), TaskSetError> {
        let mut state = self.state.lock();
        if state.destroy_failures > 0 {
            state.destroy_failures -= 1;
            return Err(TaskSetError::Unreachable("connection refused".to_string()));
        }
        if !state.live.remove(id) {
            return Err(TaskSetError::NotFound(id.to_string()));
        }
        state.destroyed.push(id.clone());
        state.destroyed_at.push(Instant::now());
        Ok(())
    }
}

type HealthScript = dyn Fn(Weight, usize) -> HealthStatus + Send + Sync;

/// Health provider answering from a script of (green weight, call number).
pub struct ScriptedHealth {
    task_sets: Arc<FakeTaskSets>,
    script: Box<HealthScript>,
    calls: AtomicUsize,
}

impl ScriptedHealth {
    pub fn from_fn(
        task_sets: Arc<FakeTaskSets>,
        script: impl Fn(Weight, usize) -> HealthStatus + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            task_sets,
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn healthy(task_sets: Arc<FakeTaskSets>) -> Arc<Self> {
        Self::from_fn(task_sets, |_, _| HealthStatus::Healthy)
    }

    pub fn never_healthy(task_sets: Arc<FakeTaskSets>) -> Arc<Self> {
        Self::from_fn(task_sets, |_, _| {
            HealthStatus::Unhealthy("connection refused".to_string())
        })
    }

    /// Unhealthy once green carries at least `weight` percent.
    pub fn unhealthy_from(task_sets: Arc<FakeTaskSets>, weight: u8) -> Arc<Self> {
        Self::from_fn(task_sets, move |current, _| {
            if current.get() >= weight {
                HealthStatus::Unhealthy(format!("5xx rate too high at {}", current))
            } else {
                HealthStatus::Healthy
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for ScriptedHealth {
    async fn check(
        &self,
        _target: &ExecutionTarget,
        _task_set: &TaskSetId,
    ) -> Result<HealthStatus, HealthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(self.task_sets.current_green_weight(), call))
    }
}

/// Source checkout returning a fixed commit and recording requested revisions.
#[derive(Debug, Default)]
pub struct FakeSource {
    fail: bool,
    revisions: Mutex<Vec<Option<String>>>,
}

impl FakeSource {
    pub const COMMIT: &'static str = "0a1b2c3d4e5f67890";

    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn revisions(&self) -> Vec<Option<String>> {
        self.revisions.lock().clone()
    }
}

#[async_trait]
impl SourceOps for FakeSource {
    async fn checkout(
        &self,
        repo: &str,
        _branch: &str,
        revision: Option<&str>,
    ) -> Result<SourceArtifact, SourceError> {
        self.revisions.lock().push(revision.map(str::to_string));
        if self.fail {
            return Err(SourceError::RepoNotFound(repo.to_string()));
        }
        Ok(SourceArtifact {
            commit_id: revision.unwrap_or(Self::COMMIT).to_string(),
            content_ref: format!("mem://{}", repo),
        })
    }
}

/// Build executor tagging images with the first 12 characters of the commit.
#[derive(Debug, Default)]
pub struct FakeBuild {
    fail: bool,
    builds: AtomicUsize,
}

impl FakeBuild {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildOps for FakeBuild {
    async fn build(&self, source: &SourceArtifact) -> Result<ImageRef, BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BuildError::Failed {
                log: "error[E0425]: cannot find value `x`".to_string(),
            });
        }
        let tag: String = source.commit_id.chars().take(12).collect();
        Ok(image(&tag))
    }
}

/// Fakes and stores shared by one test.
pub struct Harness {
    pub task_sets: Arc<FakeTaskSets>,
    pub health: Arc<ScriptedHealth>,
    pub store: Arc<MemoryStateStore>,
    pub diagnostics: Arc<Diagnostics>,
}

impl Harness {
    pub fn new(task_sets: Arc<FakeTaskSets>, health: Arc<ScriptedHealth>) -> Self {
        init_tracing();
        Self {
            task_sets,
            health,
            store: Arc::new(MemoryStateStore::new()),
            diagnostics: Arc::new(Diagnostics::default()),
        }
    }

    /// An existing blue task set and a green that is always healthy.
    pub fn healthy() -> Self {
        let task_sets = FakeTaskSets::with_primary();
        let health = ScriptedHealth::healthy(task_sets.clone());
        Self::new(task_sets, health)
    }

    pub fn controller(&self, settings: DeploySettings) -> BlueGreenController {
        BlueGreenController::new(
            self.task_sets.clone(),
            self.health.clone(),
            self.store.clone(),
            settings,
        )
        .with_diagnostics(self.diagnostics.clone())
    }

    pub fn collaborators(&self, source: Arc<FakeSource>, build: Arc<FakeBuild>) -> Collaborators {
        Collaborators {
            source,
            build,
            task_sets: self.task_sets.clone(),
            health: self.health.clone(),
        }
    }
}
