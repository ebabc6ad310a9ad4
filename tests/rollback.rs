// ABOUTME: Integration tests for explicit rollback of blue/green deployments.
// ABOUTME: Rollback restores blue to full traffic, destroys green, and is safe to repeat.

mod support;

use blueshift::deploy::{
    DeployErrorKind, DeployState, Deployment, RollbackCause, TaskSet,
};
use blueshift::ops::{PrimaryTaskSet, Slot, TaskSetOps, TaskSetSpec};
use blueshift::policy::TrafficShiftPolicy;
use blueshift::state::StateStore;
use blueshift::types::{TaskSetId, Weight};
use support::{Harness, image, settings, target};

/// A deployment caught mid-shift with green at `green_weight` percent.
async fn seed_shifting(h: &Harness, green_weight: u16) -> Deployment {
    let green_id = h
        .task_sets
        .create_task_set(
            &target(),
            &TaskSetSpec {
                slot: Slot::Green,
                image: image("v2"),
                container_port: 8080,
                task_role: "task-role".to_string(),
            },
        )
        .await
        .unwrap();

    let weight = Weight::new(green_weight).unwrap();
    let mut deployment = Deployment::new(
        None,
        target(),
        image("v2"),
        TrafficShiftPolicy::default(),
    );
    deployment.state = DeployState::Shifting;
    deployment.blue = Some(TaskSet::blue(PrimaryTaskSet {
        id: TaskSetId::new("blue-1"),
        image: image("v1"),
    }));
    let mut green = TaskSet::green(green_id, image("v2"));
    green.actual_weight = weight;
    green.desired_weight = weight;
    deployment.green = Some(green);
    if let Some(blue) = deployment.blue.as_mut() {
        blue.actual_weight = weight.complement();
    }

    h.store.save_deployment(&deployment).await.unwrap();
    deployment
}

fn manual() -> RollbackCause {
    RollbackCause::Unhealthy("operator requested".to_string())
}

#[tokio::test]
async fn rollback_restores_blue_and_destroys_green() {
    let h = Harness::healthy();
    let seeded = seed_shifting(&h, 30).await;
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    let rolled_back = controller.rollback(&seeded.id, manual()).await.unwrap();

    assert_eq!(rolled_back.state, DeployState::RolledBack { cause: manual() });
    assert_eq!(h.task_sets.green_weights(), vec![0]);
    assert_eq!(h.task_sets.destroyed(), vec![TaskSetId::new("green-1")]);
    assert!(h.task_sets.is_live("blue-1"));
    assert!(rolled_back.green.is_none());
    assert_eq!(
        rolled_back.blue.as_ref().map(|b| b.actual_weight),
        Some(Weight::FULL)
    );

    let stored = h.store.load_deployment(&seeded.id).await.unwrap().unwrap();
    assert_eq!(stored, rolled_back);
}

#[tokio::test]
async fn rollback_is_idempotent() {
    let h = Harness::healthy();
    let seeded = seed_shifting(&h, 50).await;
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    let first = controller.rollback(&seeded.id, manual()).await.unwrap();
    let second = controller
        .rollback(&seeded.id, RollbackCause::Cancelled)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.task_sets.green_weights(), vec![0]);
    assert_eq!(h.task_sets.destroyed().len(), 1);
}

#[tokio::test]
async fn rollback_at_zero_weight_skips_traffic_change() {
    let h = Harness::healthy();
    let seeded = seed_shifting(&h, 0).await;
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    controller.rollback(&seeded.id, manual()).await.unwrap();

    assert!(h.task_sets.green_weights().is_empty());
    assert_eq!(h.task_sets.destroyed(), vec![TaskSetId::new("green-1")]);
}

#[tokio::test]
async fn failed_rollback_can_be_retried() {
    let h = Harness::healthy();
    let seeded = seed_shifting(&h, 20).await;
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    h.task_sets.fail_destroy(1);
    let err = controller.rollback(&seeded.id, manual()).await.unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::RollbackFailed);

    let stored = h.store.load_deployment(&seeded.id).await.unwrap().unwrap();
    assert!(matches!(stored.state, DeployState::RollingBack { .. }));
    // Traffic was already restored before the destroy failed.
    assert_eq!(stored.green_weight(), Weight::ZERO);

    let retried = controller.rollback(&seeded.id, manual()).await.unwrap();
    assert_eq!(retried.state, DeployState::RolledBack { cause: manual() });
    assert_eq!(h.task_sets.destroyed(), vec![TaskSetId::new("green-1")]);
}

#[tokio::test]
async fn green_already_gone_still_completes_rollback() {
    let h = Harness::healthy();
    let seeded = seed_shifting(&h, 0).await;
    h.task_sets
        .destroy_task_set(&target(), &TaskSetId::new("green-1"))
        .await
        .unwrap();
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    let rolled_back = controller.rollback(&seeded.id, manual()).await.unwrap();
    assert!(matches!(rolled_back.state, DeployState::RolledBack { .. }));
}

#[tokio::test]
async fn finished_deployment_cannot_be_rolled_back() {
    let h = Harness::healthy();
    let mut seeded = seed_shifting(&h, 100).await;
    seeded.state = DeployState::Terminated;
    h.store.save_deployment(&seeded).await.unwrap();
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    let err = controller.rollback(&seeded.id, manual()).await.unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::AlreadyFinished);
    assert!(h.task_sets.destroyed().is_empty());
}

#[tokio::test]
async fn unknown_deployment_is_not_found() {
    let h = Harness::healthy();
    let controller = h.controller(settings(TrafficShiftPolicy::default()));

    let err = controller
        .rollback(&blueshift::types::DeploymentId::new("missing"), manual())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DeployErrorKind::NotFound);
}
