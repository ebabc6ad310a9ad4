// ABOUTME: Rollback of a blue/green deployment: blue back to full traffic, green destroyed.
// ABOUTME: Safe to repeat; a rolled-back deployment is left as it is.

use super::controller::BlueGreenController;
use super::deployment::Deployment;
use super::state::{DeployState, RollbackCause, Signal};
use super::DeployError;
use crate::ops::TaskSetError;
use crate::types::{DeploymentId, TrafficSplit, Weight};

impl BlueGreenController {
    /// Roll a deployment back, restoring blue to all traffic.
    ///
    /// Rolling back an already rolled-back deployment returns it unchanged. A
    /// deployment past cutover (`Finalizing` or `Terminated`) cannot be rolled back.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackFailed` if traffic cannot be restored or green
    /// cannot be destroyed; the record stays in `RollingBack` and a later call retries.
    pub async fn rollback(
        &self,
        id: &DeploymentId,
        cause: RollbackCause,
    ) -> Result<Deployment, DeployError> {
        let mut deployment = self.load(id).await?;

        match deployment.state.clone() {
            DeployState::RolledBack { .. } => return Ok(deployment),
            DeployState::RollingBack { .. } => {}
            state if state.can_roll_back() => {
                deployment.apply(Signal::RollBack(cause))?;
                self.save(&deployment).await?;
            }
            state => {
                return Err(DeployError::AlreadyFinished {
                    id: deployment.id.clone(),
                    state: state.name(),
                });
            }
        }

        let lock = self.lock(&deployment.target).await?;
        let result = self.finish_rollback(&mut deployment).await;
        self.unlock(lock).await;
        result.map(|()| deployment)
    }

    async fn finish_rollback(&self, deployment: &mut Deployment) -> Result<(), DeployError> {
        let signal = self.restore_blue(deployment).await?;
        deployment.apply(signal)?;
        self.save(deployment).await
    }

    /// Route all traffic back to blue and destroy green.
    pub(super) async fn restore_blue(
        &self,
        deployment: &mut Deployment,
    ) -> Result<Signal, DeployError> {
        let Some(green) = deployment.green.clone() else {
            return Ok(Signal::GreenDestroyed);
        };

        if let Some(blue_id) = deployment.blue.as_ref().map(|b| b.id.clone())
            && deployment.green_weight() != Weight::ZERO
        {
            match self
                .task_sets
                .apply_weights(
                    &deployment.target,
                    Some(&blue_id),
                    &green.id,
                    TrafficSplit::ALL_BLUE,
                )
                .await
            {
                Ok(()) | Err(TaskSetError::NotFound(_)) => {}
                Err(e) => {
                    return Err(DeployError::RollbackFailed(format!(
                        "failed to restore traffic to blue: {}",
                        e
                    )));
                }
            }
            deployment.record_split(TrafficSplit::ALL_BLUE);
            self.save(deployment).await?;
            tracing::info!(deployment = %deployment.id, "traffic restored to blue");
        }

        match self
            .task_sets
            .destroy_task_set(&deployment.target, &green.id)
            .await
        {
            Ok(()) | Err(TaskSetError::NotFound(_)) => {}
            Err(e) => {
                return Err(DeployError::RollbackFailed(format!(
                    "failed to destroy green task set {}: {}",
                    green.id, e
                )));
            }
        }

        tracing::info!(deployment = %deployment.id, task_set = %green.id, "green task set destroyed");
        deployment.green = None;
        Ok(Signal::GreenDestroyed)
    }
}
