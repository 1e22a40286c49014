//! Integration tests for the route sequence engine.
//!
//! After every structural operation the chain must be dense (`1..=N`),
//! the first step has no dependency and every other step depends on its
//! immediate predecessor.

use rstest::rstest;

use bomroute::domain::route::{self, NewStep, StepPatch};
use bomroute::domain::{
    DependencyGate, DomainError, Route, RouteEffect, RouteMeta, RouteStep, SamplingMode, StepId,
    StepType,
};
use bomroute::util::testing::{init_test_setup, linear_chain, route_step};

#[ctor::ctor]
fn init() {
    init_test_setup();
}

fn numbers_and_deps(steps: &[RouteStep]) -> Vec<(String, u32, Option<String>)> {
    steps
        .iter()
        .map(|s| {
            (
                s.id.to_string(),
                s.step_number,
                s.depends_on_step_id.as_ref().map(|d| d.to_string()),
            )
        })
        .collect()
}

fn assert_linear(steps: &[RouteStep]) {
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.step_number, i as u32 + 1, "numbers must be dense");
        let expected = if i == 0 { None } else { Some(&steps[i - 1].id) };
        assert_eq!(step.depends_on_step_id.as_ref(), expected, "chain broken at {}", step.id);
    }
    route::validate_for_save(steps).unwrap();
}

// ============================================================
// delete_step()
// ============================================================

#[test]
fn given_three_steps_when_deleting_middle_then_last_relinks_to_first() {
    let steps = linear_chain(3);

    let next = route::delete_step(&steps, &"2".into()).unwrap();

    assert_eq!(
        numbers_and_deps(&next),
        vec![
            ("1".to_string(), 1, None),
            ("3".to_string(), 2, Some("1".to_string()))
        ]
    );
}

#[test]
fn given_three_steps_when_deleting_first_then_new_first_has_no_dependency() {
    let next = route::delete_step(&linear_chain(3), &"1".into()).unwrap();
    assert_linear(&next);
    assert_eq!(next[0].id, StepId::from("2"));
}

#[test]
fn given_steps_sharing_first_as_dependency_when_deleting_first_then_chain_still_validates() {
    let steps = vec![
        route_step("1", 1, None),
        route_step("2", 2, Some("1")),
        route_step("3", 3, Some("1")),
    ];
    assert!(route::validate_for_save(&steps).is_ok());

    let next = route::delete_step(&steps, &"1".into()).unwrap();

    assert_eq!(
        numbers_and_deps(&next),
        vec![("2".to_string(), 1, None), ("3".to_string(), 2, Some("2".to_string()))]
    );
    assert!(route::validate_for_save(&next).is_ok());
}

#[rstest]
fn given_chain_when_deleting_any_step_then_chain_stays_linear(
    #[values(1, 2, 3, 4, 5)] n: u32,
    #[values(0, 1, 2, 4)] pick: u32,
) {
    let steps = linear_chain(n);
    let id = StepId::from(((pick % n) + 1).to_string().as_str());

    let next = route::delete_step(&steps, &id).unwrap();

    assert_eq!(next.len(), steps.len() - 1);
    assert!(next.iter().all(|s| s.id != id));
    assert_linear(&next);
}

#[test]
fn given_unknown_step_when_deleting_then_not_found() {
    assert!(matches!(
        route::delete_step(&linear_chain(2), &"9".into()),
        Err(DomainError::NotFound { .. })
    ));
}

// ============================================================
// reorder()
// ============================================================

#[rstest]
#[case("1", 2, &["2", "3", "1"])]
#[case("3", 0, &["3", "1", "2"])]
#[case("2", 1, &["1", "2", "3"])]
#[case("1", 10, &["2", "3", "1"])]
fn given_chain_when_reordering_then_order_follows_target_and_chain_is_rebuilt(
    #[case] dragged: &str,
    #[case] target: usize,
    #[case] expected: &[&str],
) {
    let next = route::reorder(&linear_chain(3), &dragged.into(), target).unwrap();

    let order: Vec<_> = next.iter().map(|s| s.id.to_string()).collect();
    assert_eq!(order, expected);
    assert_linear(&next);
}

#[test]
fn given_step_with_in_progress_gate_when_reordering_then_gate_is_preserved() {
    let mut steps = linear_chain(3);
    steps[2].can_start_when_dependency = Some(DependencyGate::InProgress);

    let next = route::reorder(&steps, &"3".into(), 1).unwrap();

    let moved = next.iter().find(|s| s.id == StepId::from("3")).unwrap();
    assert_eq!(moved.can_start_when_dependency, Some(DependencyGate::InProgress));
    let other = next.iter().find(|s| s.id == StepId::from("2")).unwrap();
    assert_eq!(other.can_start_when_dependency, Some(DependencyGate::Completed));
}

// ============================================================
// add_step() / update_step()
// ============================================================

#[test]
fn given_chain_when_adding_step_then_it_depends_on_previous_last() {
    let next = route::add_step(&linear_chain(2), NewStep::named("Pack")).unwrap();

    let added = next.last().unwrap();
    assert_eq!(added.step_number, 3);
    assert_eq!(added.depends_on_step_id, Some(StepId::from("2")));
    assert!(added.id.is_provisional());
    assert_linear(&next);
}

#[test]
fn given_blank_name_when_adding_then_validation_error() {
    assert!(matches!(
        route::add_step(&linear_chain(1), NewStep::named("  ")),
        Err(DomainError::Validation { .. })
    ));
}

#[test]
fn given_quality_check_with_sample_mode_when_updating_then_size_is_kept() {
    let patch = StepPatch {
        step_type: Some(StepType::QualityCheck),
        sampling_mode: Some(Some(SamplingMode::Sample)),
        sampling_size: Some(Some(5)),
        form_ref: Some(Some("QC-7".into())),
        ..Default::default()
    };

    let next = route::update_step(&linear_chain(2), &"2".into(), patch).unwrap();

    assert_eq!(next[1].sampling_mode, Some(SamplingMode::Sample));
    assert_eq!(next[1].sampling_size, Some(5));
    assert_eq!(next[1].form_ref.as_deref(), Some("QC-7"));
}

#[test]
fn given_negative_cycle_time_when_updating_then_validation_error() {
    let patch = StepPatch {
        cycle_time_minutes: Some(-1.0),
        ..Default::default()
    };
    assert!(matches!(
        route::update_step(&linear_chain(2), &"1".into(), patch),
        Err(DomainError::Validation { .. })
    ));
}

// ============================================================
// validate_for_save()
// ============================================================

#[test]
fn given_second_step_without_dependency_when_validating_then_names_it() {
    let steps = vec![route_step("1", 1, None), route_step("2", 2, None)];

    let err = route::validate_for_save(&steps).unwrap_err();

    assert_eq!(
        err,
        DomainError::DependencyIntegrity {
            steps: vec!["Step 2".to_string()]
        }
    );
}

#[rstest]
#[case::dangling(vec![route_step("1", 1, None), route_step("2", 2, Some("9"))], "Step 2")]
#[case::self_reference(vec![route_step("1", 1, None), route_step("2", 2, Some("2"))], "Step 2")]
#[case::first_with_dependency(vec![route_step("1", 1, Some("2")), route_step("2", 2, Some("1"))], "Step 1")]
#[case::gap_in_numbers(vec![route_step("1", 1, None), route_step("3", 3, Some("1"))], "Step 3")]
fn given_broken_chain_when_validating_then_offending_step_is_reported(
    #[case] steps: Vec<RouteStep>,
    #[case] offending: &str,
) {
    match route::validate_for_save(&steps) {
        Err(DomainError::DependencyIntegrity { steps }) => {
            assert!(steps.iter().any(|s| s == offending), "{:?}", steps)
        }
        other => panic!("expected integrity error, got {:?}", other),
    }
}

#[test]
fn given_route_with_broken_chain_when_building_batch_then_no_effect_is_produced() {
    let route = Route {
        steps: vec![route_step("1", 1, None), route_step("2", 2, None)],
        ..Route::new("r1".into(), RouteMeta::default())
    };

    assert!(matches!(
        route.save(),
        Err(DomainError::DependencyIntegrity { .. })
    ));
}

#[test]
fn given_route_with_new_step_when_saving_then_batch_flags_it_new() {
    let route = Route {
        steps: linear_chain(1),
        ..Route::new("r1".into(), RouteMeta::default())
    };

    let change = route.add_step(NewStep::named("Deburr")).unwrap();

    let Some(RouteEffect::BatchSave(batch)) = change.effect else {
        panic!("expected batch save");
    };
    assert_eq!(batch.steps.len(), 2);
    assert!(!batch.steps[0].is_new);
    assert!(batch.steps[1].is_new);
    assert_eq!(batch.steps[1].depends_on_step_id, Some(StepId::from("1")));
    assert_eq!(batch.steps[1].can_start_when_dependency, DependencyGate::Completed);
}

#[test]
fn given_steps_out_of_order_when_loading_then_sorted_by_number() {
    let steps = route::from_records(vec![
        route_step("b", 2, Some("a")),
        route_step("a", 1, None),
    ]);
    assert_eq!(steps[0].id, StepId::from("a"));
}

#[test]
fn given_setup_and_cycle_times_then_lead_time_scales_with_quantity() {
    let mut steps = linear_chain(2);
    steps[0].setup_time_minutes = 15.0;
    steps[0].cycle_time_minutes = 1.5;
    steps[1].cycle_time_minutes = 0.5;

    assert_eq!(route::lead_time(&steps, 10), 15.0 + 15.0 + 5.0);
}
