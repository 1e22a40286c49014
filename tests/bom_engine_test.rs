//! Integration tests for the BOM structure engine.

use rstest::rstest;

use bomroute::domain::bom::{self, BomEffect, BomItem, BomItemPatch, BomRecord};
use bomroute::domain::{DomainError, NodeId};
use bomroute::util::testing::{bom_record, init_test_setup};

#[ctor::ctor]
fn init() {
    init_test_setup();
}

/// 10 → 11 → 12
fn three_levels() -> Vec<BomRecord> {
    vec![
        bom_record("10", None),
        bom_record("11", Some("10")),
        bom_record("12", Some("11")),
    ]
}

#[test]
fn given_flat_records_when_building_then_three_level_chain() {
    let tree = bom::from_flat(three_levels());

    assert_eq!(tree.len(), 3);
    assert_eq!(tree.depth(), 3);
    assert_eq!(tree.parent_of(&"12".into()), Some(&NodeId::from("11")));
    assert_eq!(tree.parent_of(&"11".into()), Some(&NodeId::from("10")));
}

#[test]
fn given_chain_when_moving_item_under_its_descendant_then_rejected_without_effect() {
    let tree = bom::from_flat(three_levels());

    let result = bom::move_item(&tree, &"11".into(), Some(&"12".into()));

    assert!(matches!(
        result,
        Err(DomainError::CircularReference { .. })
    ));
    assert_eq!(bom::flatten(&tree), three_levels());
}

#[test]
fn given_valid_move_then_effect_names_item_and_new_parent() {
    let tree = bom::from_flat(three_levels());

    let change = bom::move_item(&tree, &"12".into(), Some(&"10".into())).unwrap();

    assert_eq!(
        change.effect,
        Some(BomEffect::Move {
            item_id: "12".into(),
            new_parent_id: Some("10".into()),
        })
    );
    assert_eq!(
        change.state.children_of(&"10".into()),
        vec![&NodeId::from("11"), &NodeId::from("12")]
    );
    // input snapshot stays as it was
    assert_eq!(tree.parent_of(&"12".into()), Some(&NodeId::from("11")));
}

#[test]
fn given_item_when_dropped_on_itself_then_no_effect() {
    let tree = bom::from_flat(three_levels());
    let change = bom::move_item(&tree, &"11".into(), Some(&"11".into())).unwrap();
    assert!(change.effect.is_none());
}

#[test]
fn given_root_when_moved_to_top_level_then_no_effect_and_root_order_kept() {
    let mut records = three_levels();
    records.push(bom_record("20", None));
    let tree = bom::from_flat(records);

    let change = bom::move_item(&tree, &"10".into(), None).unwrap();

    assert!(change.effect.is_none());
    let roots: Vec<_> = change.state.roots().map(|id| id.to_string()).collect();
    assert_eq!(roots, vec!["10", "20"]);
}

#[rstest]
#[case(0.0)]
#[case(-1.5)]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
fn given_non_positive_or_non_finite_quantity_when_adding_then_validation_error(#[case] quantity: f64) {
    let tree = bom::from_flat(three_levels());

    let result = bom::add_item(&tree, None, BomItem::new("SCREW", quantity, "ea"));

    assert!(matches!(result, Err(DomainError::Validation { .. })));
    assert_eq!(tree.len(), 3);
}

#[test]
fn given_valid_item_when_adding_then_appended_as_last_child_with_provisional_id() {
    let tree = bom::from_flat(three_levels());

    let change = bom::add_item(
        &tree,
        Some(&"10".into()),
        BomItem::new("WASHER", 8.0, "ea").with_designators("W1-W8"),
    )
    .unwrap();

    let Some(BomEffect::Add {
        provisional_id,
        parent_id,
        payload,
    }) = change.effect
    else {
        panic!("expected add effect");
    };
    assert!(provisional_id.is_provisional());
    assert_eq!(parent_id, Some(NodeId::from("10")));
    assert_eq!(payload.reference_designators.as_deref(), Some("W1-W8"));
    assert_eq!(
        change.state.children_of(&"10".into()).last(),
        Some(&&provisional_id)
    );
}

#[test]
fn given_unknown_parent_when_adding_then_not_found() {
    let tree = bom::from_flat(three_levels());
    let result = bom::add_item(&tree, Some(&"99".into()), BomItem::new("X", 1.0, "ea"));
    assert!(matches!(result, Err(DomainError::NotFound { .. })));
}

#[test]
fn given_subassembly_when_removing_then_whole_subtree_goes() {
    let mut records = three_levels();
    records.push(bom_record("20", None));
    let tree = bom::from_flat(records);

    let change = bom::remove_item(&tree, &"11".into()).unwrap();

    let effect = change.effect.unwrap();
    assert_eq!(
        effect.removed_ids(),
        &[NodeId::from("11"), NodeId::from("12")]
    );
    assert_eq!(change.state.len(), 2);
    assert!(change.state.children_of(&"10".into()).is_empty());
}

#[test]
fn given_patch_when_updating_then_payload_carries_merged_fields() {
    let tree = bom::from_flat(three_levels());
    let patch = BomItemPatch {
        quantity: Some(3.0),
        notes: Some(Some("torque 4Nm".into())),
        ..Default::default()
    };

    let change = bom::update_item(&tree, &"12".into(), patch).unwrap();

    match change.effect {
        Some(BomEffect::Update { item_id, payload }) => {
            assert_eq!(item_id, NodeId::from("12"));
            assert_eq!(payload.quantity, 3.0);
            assert_eq!(payload.item_ref, "P-12");
            assert_eq!(payload.notes.as_deref(), Some("torque 4Nm"));
        }
        other => panic!("unexpected effect {:?}", other),
    }
}

#[test]
fn given_zero_quantity_patch_when_updating_then_validation_error() {
    let tree = bom::from_flat(three_levels());
    let patch = BomItemPatch {
        quantity: Some(0.0),
        ..Default::default()
    };
    assert!(matches!(
        bom::update_item(&tree, &"12".into(), patch),
        Err(DomainError::Validation { .. })
    ));
}

#[test]
fn given_records_when_flattening_after_build_then_round_trips() {
    let mut records = three_levels();
    records.push(bom_record("13", Some("10")));
    let tree = bom::from_flat(records.clone());

    let flattened = bom::flatten(&tree);

    // pre-order puts 13 after the 11 subtree
    let ids: Vec<_> = flattened.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["10", "11", "12", "13"]);
    for record in &records {
        assert!(flattened.contains(record));
    }
}

#[test]
fn given_sequence_of_edits_when_flattening_then_rebuild_gives_same_records() {
    let mut tree = bom::from_flat(three_levels());
    tree = bom::add_item(&tree, Some(&"10".into()), BomItem::new("WASHER", 2.0, "ea"))
        .unwrap()
        .state;
    tree = bom::move_item(&tree, &"12".into(), None).unwrap().state;
    tree = bom::move_item(&tree, &"10".into(), Some(&"12".into())).unwrap().state;
    tree = bom::remove_item(&tree, &"11".into()).unwrap().state;

    let flattened = bom::flatten(&tree);
    let rebuilt = bom::flatten(&bom::from_flat(flattened.clone()));

    assert_eq!(flattened, rebuilt);
    assert_eq!(tree.parent_of(&"10".into()), Some(&NodeId::from("12")));
}

#[test]
fn given_quantities_per_level_when_exploding_then_extended_quantities_multiply() {
    let mut records = three_levels();
    records[0].quantity = 2.0;
    records[1].quantity = 4.0;
    records[2].quantity = 0.5;
    let tree = bom::from_flat(records);

    let lines = bom::explode(&tree);

    let got: Vec<_> = lines
        .iter()
        .map(|l| (l.id.to_string(), l.level, l.extended_quantity))
        .collect();
    assert_eq!(
        got,
        vec![
            ("10".to_string(), 0, 2.0),
            ("11".to_string(), 1, 8.0),
            ("12".to_string(), 2, 4.0)
        ]
    );
}
