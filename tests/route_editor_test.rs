//! Tests for RouteEditor: batch saves, id assignment and execution tracking.

use std::sync::Arc;

use bomroute::application::services::RouteEditor;
use bomroute::application::ApplicationError;
use bomroute::domain::{
    DomainError, NewStep, RouteMeta, RouteRecord, StepAction, StepId, StepStatus,
};
use bomroute::infrastructure::InMemoryStore;
use bomroute::util::testing::{init_test_setup, linear_chain, route_step, RecordingNotifier};

fn record(steps: Vec<bomroute::domain::RouteStep>) -> RouteRecord {
    RouteRecord {
        id: "r1".into(),
        name: "Bracket".into(),
        revision: "A".into(),
        description: None,
        steps,
    }
}

fn setup(steps: Vec<bomroute::domain::RouteStep>) -> (Arc<InMemoryStore>, Arc<RecordingNotifier>, RouteEditor) {
    init_test_setup();
    let store = Arc::new(InMemoryStore::with_routes(vec![record(steps)]));
    let notifier = Arc::new(RecordingNotifier::default());
    let editor = RouteEditor::load(&"r1".into(), store.clone(), notifier.clone()).unwrap();
    (store, notifier, editor)
}

#[test]
fn given_broken_chain_when_saving_then_integrity_error_and_no_batch_save_call() {
    let (store, notifier, mut editor) = setup(vec![route_step("1", 1, None), route_step("2", 2, None)]);

    let err = editor.save().unwrap_err();

    match err {
        ApplicationError::Domain(DomainError::DependencyIntegrity { steps }) => {
            assert_eq!(steps, vec!["Step 2".to_string()])
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(store.calls(), vec!["loadRoute"]);
    assert!(notifier.messages().is_empty());
}

#[test]
fn given_new_step_when_saved_then_store_assigns_id_and_local_chain_uses_it() {
    let (store, _, mut editor) = setup(linear_chain(2));

    let id = editor.add_step(NewStep::named("Deburr")).unwrap();

    assert!(!id.is_provisional());
    let steps = &editor.route().steps;
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[2].id, id);
    assert_eq!(steps[2].depends_on_step_id, Some(StepId::from("2")));
    assert!(steps.iter().all(|s| !s.id.is_provisional()));

    let remote = &store.document().routes[0];
    assert_eq!(remote.steps[2].id, id);
    assert!(store.calls().contains(&"batchSaveRoute".to_string()));
}

#[test]
fn given_two_new_steps_chained_when_saved_then_dependency_follows_assigned_id() {
    let (store, _, mut editor) = setup(vec![]);

    let first = editor.add_step(NewStep::named("Cut")).unwrap();
    let second = editor.add_step(NewStep::named("Weld")).unwrap();

    let remote = &store.document().routes[0];
    assert_eq!(remote.steps[0].id, first);
    assert_eq!(remote.steps[1].depends_on_step_id, Some(first));
    assert_eq!(remote.steps[1].id, second);
}

#[test]
fn given_batch_save_fails_then_local_route_is_restored() {
    let (store, notifier, mut editor) = setup(linear_chain(3));
    let before = editor.route().clone();
    store.fail_next("timeout");

    let result = editor.delete_step(&"2".into());

    assert!(matches!(result, Err(ApplicationError::Sync(_))));
    assert_eq!(editor.route(), &before);
    assert_eq!(notifier.errors().len(), 1);
    assert_eq!(store.document().routes[0].steps.len(), 3);
}

#[test]
fn given_deleted_step_when_saved_then_removed_remotely_and_chain_relinked() {
    let (store, _, mut editor) = setup(linear_chain(3));

    editor.delete_step(&"2".into()).unwrap();

    let remote = &store.document().routes[0];
    let ids: Vec<_> = remote.steps.iter().map(|s| s.id.to_string()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(remote.steps[1].depends_on_step_id, Some(StepId::from("1")));
    assert_eq!(remote.steps[1].step_number, 2);
    assert!(editor.route().deleted_step_ids.is_empty());
}

#[test]
fn given_reorder_when_saved_then_remote_chain_is_linear() {
    let (store, _, mut editor) = setup(linear_chain(3));

    editor.reorder(&"3".into(), 0).unwrap();

    let remote = &store.document().routes[0];
    let chain: Vec<_> = remote
        .steps
        .iter()
        .map(|s| (s.id.to_string(), s.depends_on_step_id.as_ref().map(|d| d.to_string())))
        .collect();
    assert_eq!(
        chain,
        vec![
            ("3".to_string(), None),
            ("1".to_string(), Some("3".to_string())),
            ("2".to_string(), Some("1".to_string())),
        ]
    );
}

#[test]
fn given_started_step_when_recorded_then_status_and_timestamp_persisted() {
    let (store, _, mut editor) = setup(linear_chain(2));

    editor.transition(&"1".into(), StepAction::Start).unwrap();

    let remote = &store.document().routes[0].steps[0];
    assert_eq!(remote.status, StepStatus::InProgress);
    assert!(remote.started_at.is_some());
    assert_eq!(store.calls().last().map(String::as_str), Some("recordStepStatus"));
}

#[test]
fn given_blocked_step_when_starting_then_no_store_call() {
    let (store, _, mut editor) = setup(linear_chain(2));

    let result = editor.transition(&"2".into(), StepAction::Start);

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::DependencyNotSatisfied { .. }))
    ));
    assert_eq!(store.calls(), vec!["loadRoute"]);
}

#[test]
fn given_status_change_fails_then_step_returns_to_previous_status() {
    let (store, _, mut editor) = setup(linear_chain(1));
    store.fail_next("offline");

    assert!(editor.transition(&"1".into(), StepAction::Start).is_err());

    let step = editor.route().step(&"1".into()).unwrap();
    assert_eq!(step.status, StepStatus::Pending);
    assert!(step.started_at.is_none());
}

#[test]
fn given_existing_statuses_when_batch_saved_then_execution_state_survives() {
    let mut steps = linear_chain(2);
    steps[0].status = StepStatus::Completed;
    let (store, _, mut editor) = setup(steps);

    editor.add_step(NewStep::named("Pack")).unwrap();

    assert_eq!(store.document().routes[0].steps[0].status, StepStatus::Completed);
}

#[test]
fn given_new_route_when_created_then_persisted_empty() {
    init_test_setup();
    let store = Arc::new(InMemoryStore::default());
    let meta = RouteMeta {
        name: "Housing".into(),
        revision: "B".into(),
        description: Some("cast housing".into()),
    };

    let editor = RouteEditor::create(
        "housing".into(),
        meta,
        store.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .unwrap();

    assert!(editor.route().steps.is_empty());
    let routes = store.document().routes;
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].name, "Housing");
    assert_eq!(routes[0].revision, "B");
}

#[test]
fn given_lot_size_then_lead_time_uses_loaded_times() {
    let mut steps = linear_chain(2);
    steps[0].setup_time_minutes = 30.0;
    steps[1].cycle_time_minutes = 2.0;
    let (_, _, editor) = setup(steps);

    assert_eq!(editor.lead_time(5), 40.0);
}
