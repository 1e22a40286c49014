//! Integration tests for the step execution state machine.

use chrono::{TimeZone, Utc};
use rstest::rstest;

use bomroute::domain::execution::{self, next_status};
use bomroute::domain::{DependencyGate, DomainError, RouteStep, StepAction, StepId, StepStatus};
use bomroute::util::testing::linear_chain;

fn at(minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, minute, 0).unwrap()
}

fn with_status(mut steps: Vec<RouteStep>, statuses: &[StepStatus]) -> Vec<RouteStep> {
    for (step, status) in steps.iter_mut().zip(statuses) {
        step.status = *status;
    }
    steps
}

#[rstest]
#[case(StepStatus::Pending, StepAction::Enqueue, Some(StepStatus::Queued))]
#[case(StepStatus::Pending, StepAction::Start, Some(StepStatus::InProgress))]
#[case(StepStatus::Queued, StepAction::Start, Some(StepStatus::InProgress))]
#[case(StepStatus::InProgress, StepAction::Pause, Some(StepStatus::OnHold))]
#[case(StepStatus::OnHold, StepAction::Resume, Some(StepStatus::InProgress))]
#[case(StepStatus::InProgress, StepAction::Finish, Some(StepStatus::Completed))]
#[case(StepStatus::OnHold, StepAction::Skip, Some(StepStatus::Skipped))]
#[case(StepStatus::Queued, StepAction::Enqueue, None)]
#[case(StepStatus::Pending, StepAction::Finish, None)]
#[case(StepStatus::OnHold, StepAction::Finish, None)]
#[case(StepStatus::Completed, StepAction::Skip, None)]
fn given_status_and_action_then_next_status_follows_lifecycle(
    #[case] current: StepStatus,
    #[case] action: StepAction,
    #[case] expected: Option<StepStatus>,
) {
    assert_eq!(next_status(current, action), expected);
}

#[test]
fn given_pending_dependency_when_starting_then_dependency_not_satisfied() {
    let steps = linear_chain(2);

    let err = execution::transition(&steps, &"2".into(), StepAction::Start, at(0)).unwrap_err();

    assert_eq!(
        err,
        DomainError::DependencyNotSatisfied {
            step: "2".into(),
            dependency: "1".into(),
            status: StepStatus::Pending,
        }
    );
}

#[rstest]
#[case(DependencyGate::Completed, StepStatus::Completed, true)]
#[case(DependencyGate::Completed, StepStatus::InProgress, false)]
#[case(DependencyGate::InProgress, StepStatus::InProgress, true)]
#[case(DependencyGate::InProgress, StepStatus::Completed, true)]
#[case(DependencyGate::InProgress, StepStatus::Queued, false)]
#[case(DependencyGate::Completed, StepStatus::Skipped, true)]
fn given_gate_and_dependency_status_when_starting_then_gate_decides(
    #[case] gate: DependencyGate,
    #[case] dependency: StepStatus,
    #[case] allowed: bool,
) {
    let mut steps = with_status(linear_chain(2), &[dependency]);
    steps[1].can_start_when_dependency = Some(gate);

    let result = execution::transition(&steps, &"2".into(), StepAction::Start, at(0));

    assert_eq!(result.is_ok(), allowed, "{:?}", result);
}

#[test]
fn given_step_started_paused_resumed_finished_then_timestamps_are_recorded_once() {
    let steps = linear_chain(1);
    let id = StepId::from("1");

    let steps = execution::transition(&steps, &id, StepAction::Start, at(0)).unwrap();
    let steps = execution::transition(&steps, &id, StepAction::Pause, at(5)).unwrap();
    let steps = execution::transition(&steps, &id, StepAction::Resume, at(10)).unwrap();
    let steps = execution::transition(&steps, &id, StepAction::Finish, at(20)).unwrap();

    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].started_at, Some(at(0)));
    assert_eq!(steps[0].completed_at, Some(at(20)));
}

#[test]
fn given_completed_step_when_starting_again_then_invalid_transition() {
    let steps = with_status(linear_chain(1), &[StepStatus::Completed]);

    let err = execution::transition(&steps, &"1".into(), StepAction::Start, at(0)).unwrap_err();

    assert!(matches!(
        err,
        DomainError::InvalidTransition {
            status: StepStatus::Completed,
            action: StepAction::Start,
            ..
        }
    ));
}

#[test]
fn given_blocked_step_when_skipping_then_allowed_regardless_of_dependency() {
    let steps = linear_chain(2);
    let next = execution::transition(&steps, &"2".into(), StepAction::Skip, at(0)).unwrap();
    assert_eq!(next[1].status, StepStatus::Skipped);
    assert!(next[1].started_at.is_none());
}
