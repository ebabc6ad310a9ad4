// ABOUTME: Blue/green controller that drives a deployment through its state machine.
// ABOUTME: Performs task set operations and health polling, persisting the record after every step.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::deployment::{Deployment, TaskSet};
use super::lock::DeployLock;
use super::settings::DeploySettings;
use super::state::{DeployState, RollbackCause, Signal};
use super::DeployError;
use crate::diagnostics::{Diagnostics, Warning};
use crate::ops::{
    ExecutionTarget, HealthCheck, HealthStatus, Slot, TaskSetError, TaskSetOps, TaskSetSpec,
};
use crate::pipeline::Cancellation;
use crate::state::StateStore;
use crate::types::{DeploymentId, ExecutionId, ImageRef, TrafficSplit, Weight};

/// What to deploy, and where.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub execution_id: Option<ExecutionId>,
    pub target: ExecutionTarget,
    pub image: ImageRef,
}

/// Outcome of one health observation.
enum Observation {
    Healthy,
    Unhealthy(String),
    Cancelled,
}

/// Drives blue/green deployments against a task set provider and a health-check provider.
pub struct BlueGreenController {
    pub(super) task_sets: Arc<dyn TaskSetOps>,
    health: Arc<dyn HealthCheck>,
    pub(super) store: Arc<dyn StateStore>,
    settings: DeploySettings,
    pub(super) diagnostics: Arc<Diagnostics>,
}

impl std::fmt::Debug for BlueGreenController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueGreenController")
            .field("settings", &self.settings)
            .finish()
    }
}

impl BlueGreenController {
    pub fn new(
        task_sets: Arc<dyn TaskSetOps>,
        health: Arc<dyn HealthCheck>,
        store: Arc<dyn StateStore>,
        settings: DeploySettings,
    ) -> Self {
        Self {
            task_sets,
            health,
            store,
            settings,
            diagnostics: Arc::new(Diagnostics::default()),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Start a deployment and drive it to `Terminated` or `RolledBack`.
    ///
    /// A rollback is a normal outcome and returns `Ok`; inspect the returned state.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::TerminationDelivery` when the old task set cannot be
    /// destroyed; the persisted record then stays in `Finalizing`.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        cancel: &Cancellation,
    ) -> Result<Deployment, DeployError> {
        let lock = self.lock(&request.target).await?;
        let result = self.start(request, cancel).await;
        self.unlock(lock).await;
        result
    }

    /// Continue a persisted deployment from its last recorded state.
    pub async fn resume(
        &self,
        id: &DeploymentId,
        cancel: &Cancellation,
    ) -> Result<Deployment, DeployError> {
        let mut deployment = self.load(id).await?;
        if deployment.state.is_terminal() {
            return Ok(deployment);
        }

        let lock = self.lock(&deployment.target).await?;
        tracing::info!(
            deployment = %deployment.id,
            state = deployment.state.name(),
            "resuming deployment"
        );
        let result = self.drive(&mut deployment, cancel).await.map(|()| deployment);
        self.unlock(lock).await;
        result
    }

    /// Latest deployment started by `execution`, in any state.
    pub async fn find_for_execution(
        &self,
        execution: &ExecutionId,
    ) -> Result<Option<Deployment>, DeployError> {
        let deployments = self.store.list_deployments().await?;
        Ok(deployments
            .into_iter()
            .filter(|d| d.execution_id.as_ref() == Some(execution))
            .next_back())
    }

    async fn start(
        &self,
        request: DeployRequest,
        cancel: &Cancellation,
    ) -> Result<Deployment, DeployError> {
        let primary = self
            .task_sets
            .primary_task_set(&request.target)
            .await
            .map_err(DeployError::Discovery)?;

        let mut deployment = Deployment::new(
            request.execution_id,
            request.target,
            request.image,
            self.settings.policy,
        );
        deployment.blue = primary.map(TaskSet::blue);

        tracing::info!(
            deployment = %deployment.id,
            target = %deployment.target,
            image = %deployment.image,
            policy = %deployment.policy,
            first = deployment.is_first_deployment(),
            "starting blue/green deployment"
        );

        self.save(&deployment).await?;
        self.drive(&mut deployment, cancel).await?;
        Ok(deployment)
    }

    async fn drive(
        &self,
        deployment: &mut Deployment,
        cancel: &Cancellation,
    ) -> Result<(), DeployError> {
        // Rebuild the shift clock from the record when resuming.
        let mut last_shift = deployment.last_shift_at.map(|at| {
            let elapsed = (Utc::now() - at).to_std().unwrap_or(Duration::ZERO);
            Instant::now()
                .checked_sub(elapsed)
                .unwrap_or_else(Instant::now)
        });

        loop {
            let signal = match deployment.state.clone() {
                DeployState::Provisioning => self.provision(deployment, cancel).await?,
                DeployState::Shifting => self.shift(deployment, cancel, &mut last_shift).await?,
                DeployState::Validating => self.validate(deployment, cancel).await?,
                DeployState::Finalizing { deadline } => self.finalize(deployment, deadline).await?,
                DeployState::RollingBack { .. } => self.restore_blue(deployment).await?,
                DeployState::Terminated | DeployState::RolledBack { .. } => return Ok(()),
            };
            deployment.apply(signal)?;
            self.save(deployment).await?;
        }
    }

    /// Create green at weight 0 and wait for it to report healthy.
    async fn provision(
        &self,
        deployment: &mut Deployment,
        cancel: &Cancellation,
    ) -> Result<Signal, DeployError> {
        if cancel.is_cancelled() {
            return Ok(Signal::RollBack(RollbackCause::Cancelled));
        }

        if deployment.green.is_none() {
            let spec = TaskSetSpec {
                slot: Slot::Green,
                image: deployment.image.clone(),
                container_port: self.settings.container_port,
                task_role: self.settings.task_role.clone(),
            };
            match self
                .task_sets
                .create_task_set(&deployment.target, &spec)
                .await
            {
                Ok(id) => {
                    tracing::info!(deployment = %deployment.id, task_set = %id, "green task set created");
                    deployment.green = Some(TaskSet::green(id, deployment.image.clone()));
                    self.save(deployment).await?;
                }
                Err(e) => {
                    return Ok(Signal::RollBack(RollbackCause::OperationFailed(format!(
                        "failed to create green task set: {}",
                        e
                    ))));
                }
            }
        }

        let started = Instant::now();
        let startup_timeout = self.settings.health.startup_timeout;
        loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Signal::RollBack(RollbackCause::Cancelled)),
                status = self.check_once(deployment) => status,
            };

            match status {
                HealthStatus::Healthy => {
                    deployment.record_health(HealthStatus::Healthy);
                    return Ok(Signal::GreenHealthy);
                }
                HealthStatus::Unhealthy(reason) => {
                    if started.elapsed() >= startup_timeout {
                        deployment.record_health(HealthStatus::Unhealthy(reason.clone()));
                        return Ok(Signal::RollBack(RollbackCause::Unhealthy(format!(
                            "not healthy within {}s: {}",
                            startup_timeout.as_secs(),
                            reason
                        ))));
                    }
                    tracing::debug!(deployment = %deployment.id, %reason, "green not healthy yet");
                }
            }

            if self.pause(self.settings.health.interval, cancel).await {
                return Ok(Signal::RollBack(RollbackCause::Cancelled));
            }
        }
    }

    /// Wait until the policy allows the next step, then apply it.
    async fn shift(
        &self,
        deployment: &mut Deployment,
        cancel: &Cancellation,
        last_shift: &mut Option<Instant>,
    ) -> Result<Signal, DeployError> {
        let current = deployment.green_weight();

        // Nothing to shift away from on a first deployment.
        let next = if deployment.is_first_deployment() {
            Weight::FULL
        } else {
            loop {
                let since = last_shift.map(|at| at.elapsed());
                let next = deployment.policy.next_weight(since, current);
                let hold = deployment.policy.hold_remaining(since, current);
                if next != current || hold.is_zero() {
                    break next;
                }
                if let Some(signal) = self.hold(deployment, hold, cancel).await? {
                    return Ok(signal);
                }
            }
        };

        if cancel.is_cancelled() {
            return Ok(Signal::RollBack(RollbackCause::Cancelled));
        }

        let Some(green_id) = deployment.green.as_ref().map(|g| g.id.clone()) else {
            return Ok(Signal::RollBack(RollbackCause::OperationFailed(
                "green task set missing from record".to_string(),
            )));
        };
        let blue_id = deployment.blue.as_ref().map(|b| b.id.clone());
        let split = TrafficSplit::with_green(next);

        if let Err(e) = self
            .task_sets
            .apply_weights(&deployment.target, blue_id.as_ref(), &green_id, split)
            .await
        {
            return Ok(Signal::RollBack(RollbackCause::OperationFailed(format!(
                "failed to shift traffic to {}: {}",
                split, e
            ))));
        }

        deployment.record_split(split);
        deployment.last_shift_at = Some(Utc::now());
        *last_shift = Some(Instant::now());
        tracing::info!(deployment = %deployment.id, %split, "traffic shifted");

        Ok(Signal::Shifted)
    }

    /// Check green after a shift; at full weight, observe for the validation window first.
    async fn validate(
        &self,
        deployment: &mut Deployment,
        cancel: &Cancellation,
    ) -> Result<Signal, DeployError> {
        let weight = deployment.green_weight();
        let window = self.settings.validation_window;

        if weight.is_full()
            && !window.is_zero()
            && let Some(signal) = self.hold(deployment, window, cancel).await?
        {
            return Ok(signal);
        }

        match self.observe(deployment, cancel).await? {
            Observation::Healthy => {
                let drain = if deployment.is_first_deployment() {
                    Duration::ZERO
                } else {
                    self.settings.termination_time
                };
                let deadline = deadline_after(drain);

                if weight.is_full() {
                    if let Some(blue) = deployment.blue.as_mut() {
                        blue.termination_deadline = Some(deadline);
                    }
                    tracing::info!(
                        deployment = %deployment.id,
                        %deadline,
                        "cutover complete, old task set draining"
                    );
                }

                Ok(Signal::Healthy {
                    green_weight: weight,
                    termination_deadline: deadline,
                })
            }
            Observation::Unhealthy(reason) => {
                tracing::warn!(deployment = %deployment.id, %weight, %reason, "green failed validation");
                Ok(Signal::RollBack(RollbackCause::Unhealthy(reason)))
            }
            Observation::Cancelled => Ok(Signal::RollBack(RollbackCause::Cancelled)),
        }
    }

    /// Wait for the drain deadline, then destroy blue. Cancellation is ignored here.
    async fn finalize(
        &self,
        deployment: &mut Deployment,
        deadline: DateTime<Utc>,
    ) -> Result<Signal, DeployError> {
        let Some(blue) = deployment.blue.clone() else {
            return Ok(Signal::BlueTerminated);
        };

        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        // Round up so wall-clock skew never destroys blue early.
        let remaining = Duration::from_secs(
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
        );
        if !remaining.is_zero() {
            tracing::info!(
                deployment = %deployment.id,
                task_set = %blue.id,
                drain_secs = remaining.as_secs(),
                "waiting before terminating old task set"
            );
            tokio::time::sleep(remaining).await;
        }

        let retry = self.settings.termination;
        let attempts = retry.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .task_sets
                .destroy_task_set(&deployment.target, &blue.id)
                .await
            {
                Ok(()) | Err(TaskSetError::NotFound(_)) => {
                    tracing::info!(deployment = %deployment.id, task_set = %blue.id, "old task set terminated");
                    deployment.blue = None;
                    deployment.stuck = None;
                    return Ok(Signal::BlueTerminated);
                }
                Err(e) => {
                    tracing::warn!(
                        deployment = %deployment.id,
                        attempt,
                        attempts,
                        error = %e,
                        "failed to terminate old task set"
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(retry.interval).await;
                    }
                }
            }
        }

        deployment.stuck = Some(last_error.clone());
        deployment.updated_at = Utc::now();
        self.save(deployment).await?;

        self.diagnostics.warn(Warning::stuck_deployment(format!(
            "deployment {} stuck: old task set {} could not be terminated: {}",
            deployment.id, blue.id, last_error
        )));

        Err(DeployError::TerminationDelivery {
            deployment: deployment.id.clone(),
            task_set: blue.id,
            attempts,
            reason: last_error,
        })
    }

    /// Hold for `duration`, polling green's health every interval.
    ///
    /// Returns a rollback signal if green turns unhealthy or the execution is cancelled.
    async fn hold(
        &self,
        deployment: &mut Deployment,
        duration: Duration,
        cancel: &Cancellation,
    ) -> Result<Option<Signal>, DeployError> {
        let until = Instant::now() + duration;
        let interval = self.settings.health.interval;

        loop {
            let now = Instant::now();
            if now >= until {
                return Ok(None);
            }
            let remaining = until - now;
            let step = if interval.is_zero() {
                remaining
            } else {
                remaining.min(interval)
            };

            if self.pause(step, cancel).await {
                return Ok(Some(Signal::RollBack(RollbackCause::Cancelled)));
            }

            match self.observe(deployment, cancel).await? {
                Observation::Healthy => {}
                Observation::Unhealthy(reason) => {
                    return Ok(Some(Signal::RollBack(RollbackCause::Unhealthy(reason))));
                }
                Observation::Cancelled => {
                    return Ok(Some(Signal::RollBack(RollbackCause::Cancelled)));
                }
            }
        }
    }

    /// One health decision: a check plus up to `health.retries` re-checks.
    async fn observe(
        &self,
        deployment: &mut Deployment,
        cancel: &Cancellation,
    ) -> Result<Observation, DeployError> {
        let mut retries_remaining = self.settings.health.retries;

        loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Observation::Cancelled),
                status = self.check_once(deployment) => status,
            };
            deployment.record_health(status.clone());
            self.save(deployment).await?;

            match status {
                HealthStatus::Healthy => return Ok(Observation::Healthy),
                HealthStatus::Unhealthy(reason) if retries_remaining == 0 => {
                    return Ok(Observation::Unhealthy(reason));
                }
                HealthStatus::Unhealthy(reason) => {
                    retries_remaining -= 1;
                    tracing::debug!(deployment = %deployment.id, %reason, retries_remaining, "green unhealthy, re-checking");
                }
            }

            if self.pause(self.settings.health.interval, cancel).await {
                return Ok(Observation::Cancelled);
            }
        }
    }

    /// Ask the provider once. Provider errors and timeouts count as unhealthy.
    async fn check_once(&self, deployment: &Deployment) -> HealthStatus {
        let Some(green) = deployment.green.as_ref() else {
            return HealthStatus::Unhealthy("green task set missing".to_string());
        };

        let timeout = self.settings.health.timeout;
        match tokio::time::timeout(timeout, self.health.check(&deployment.target, &green.id)).await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => HealthStatus::Unhealthy(format!("health check error: {}", e)),
            Err(_elapsed) => HealthStatus::Unhealthy(format!(
                "health check timed out after {}",
                humantime_serde::re::humantime::format_duration(timeout)
            )),
        }
    }

    /// Sleep unless cancelled first. Returns `true` on cancellation.
    async fn pause(&self, duration: Duration, cancel: &Cancellation) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    pub(super) async fn load(&self, id: &DeploymentId) -> Result<Deployment, DeployError> {
        self.store
            .load_deployment(id)
            .await?
            .ok_or_else(|| DeployError::NotFound(id.clone()))
    }

    pub(super) async fn save(&self, deployment: &Deployment) -> Result<(), DeployError> {
        self.store.save_deployment(deployment).await?;
        Ok(())
    }

    pub(super) async fn lock(
        &self,
        target: &ExecutionTarget,
    ) -> Result<Option<DeployLock>, DeployError> {
        match &self.settings.lock {
            Some(settings) => DeployLock::acquire(settings, &target.name).await.map(Some),
            None => Ok(None),
        }
    }

    pub(super) async fn unlock(&self, lock: Option<DeployLock>) {
        if let Some(lock) = lock
            && let Err(e) = lock.release().await
        {
            self.diagnostics.warn(Warning::lock_release(e.to_string()));
        }
    }
}

fn deadline_after(drain: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(drain)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
