// ABOUTME: Property tests for traffic-shift policy evaluation.
// ABOUTME: Checks monotonic weights, schedule shape, and named configuration parsing.

use blueshift::policy::{DeploymentConfigName, ShiftKind, TrafficShiftPolicy};
use blueshift::types::Weight;
use proptest::prelude::*;
use std::time::Duration;

fn any_policy() -> impl Strategy<Value = TrafficShiftPolicy> {
    prop_oneof![
        (1u16..=100, 1u64..=600).prop_map(|(step, secs)| {
            TrafficShiftPolicy::linear(step, Duration::from_secs(secs)).unwrap()
        }),
        (1u16..=100, 0u64..=1800).prop_map(|(step, secs)| {
            TrafficShiftPolicy::canary(step, Duration::from_secs(secs)).unwrap()
        }),
        Just(TrafficShiftPolicy::all_at_once()),
    ]
}

proptest! {
    #[test]
    fn next_weight_never_decreases(
        policy in any_policy(),
        current in 0u16..=100,
        elapsed in proptest::option::of(0u64..=3600),
    ) {
        let current = Weight::new(current).unwrap();
        let next = policy.next_weight(elapsed.map(Duration::from_secs), current);
        prop_assert!(next >= current);
        prop_assert!(next.get() <= 100);
    }

    #[test]
    fn first_shift_is_immediate(policy in any_policy()) {
        prop_assert_eq!(policy.hold_remaining(None, Weight::ZERO), Duration::ZERO);
        prop_assert!(policy.next_weight(None, Weight::ZERO) > Weight::ZERO);
    }

    #[test]
    fn hold_then_shift_moves_traffic(
        policy in any_policy(),
        current in 1u16..100,
        elapsed in 0u64..=3600,
    ) {
        let current = Weight::new(current).unwrap();
        let elapsed = Duration::from_secs(elapsed);
        let hold = policy.hold_remaining(Some(elapsed), current);
        prop_assert!(policy.next_weight(Some(elapsed + hold), current) > current);
    }

    #[test]
    fn schedule_ends_at_full_weight(policy in any_policy()) {
        let schedule = policy.schedule();
        prop_assert!(!schedule.is_empty());
        prop_assert_eq!(schedule.last().map(|s| s.weight), Some(Weight::FULL));
        prop_assert_eq!(schedule[0].offset, Duration::ZERO);
        for pair in schedule.windows(2) {
            prop_assert!(pair[1].weight > pair[0].weight);
            prop_assert!(pair[1].offset >= pair[0].offset);
        }
    }

    #[test]
    fn linear_schedule_length(step in 1u16..=100, secs in 1u64..=600) {
        let policy = TrafficShiftPolicy::linear(step, Duration::from_secs(secs)).unwrap();
        let expected = 100usize.div_ceil(step as usize);
        prop_assert_eq!(policy.schedule().len(), expected);
        prop_assert_eq!(
            policy.total_duration(),
            Duration::from_secs(secs) * (expected as u32 - 1)
        );
    }

    #[test]
    fn yaml_round_trip_preserves_policy(policy in any_policy()) {
        let yaml = serde_yaml::to_string(&policy).unwrap();
        let parsed: TrafficShiftPolicy = serde_yaml::from_str(&yaml).unwrap();
        prop_assert_eq!(parsed, policy);
    }
}

#[test]
fn canary_full_step_is_single_shift() {
    let policy = TrafficShiftPolicy::canary(100, Duration::from_secs(300)).unwrap();
    assert_eq!(policy.schedule().len(), 1);
    assert_eq!(policy.total_duration(), Duration::ZERO);
}

#[test]
fn named_configs_parse_from_their_display() {
    for name in DeploymentConfigName::ALL {
        let parsed: DeploymentConfigName = name.to_string().parse().unwrap();
        assert_eq!(parsed, name);

        let prefixed: DeploymentConfigName = format!("CodeDeployDefault.ECS{}", name)
            .parse()
            .unwrap();
        assert_eq!(prefixed, name);
    }
}

#[test]
fn named_configs_use_ten_percent_steps() {
    for name in DeploymentConfigName::ALL {
        let policy = name.policy();
        match policy.kind() {
            ShiftKind::AllAtOnce => assert_eq!(policy.schedule().len(), 1),
            ShiftKind::Linear | ShiftKind::Canary => assert_eq!(policy.step().get(), 10),
        }
    }
}

#[test]
fn named_schedules_match_their_names() {
    assert_eq!(
        DeploymentConfigName::Linear10PercentEvery3Minutes
            .policy()
            .total_duration(),
        Duration::from_secs(9 * 180)
    );
    assert_eq!(
        DeploymentConfigName::Canary10Percent5Minutes
            .policy()
            .total_duration(),
        Duration::from_secs(300)
    );
}
