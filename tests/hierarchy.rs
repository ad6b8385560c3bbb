mod common;

use common::*;
use compass_interface_core::CompassError;
use compass_interface_core::batch::unit_members;
use compass_interface_core::hierarchy::Hierarchy;
use compass_interface_core::models::hierarchy::{HierarchyEndpoint, UnitLevel};

fn hierarchy(compass: &FakeCompass) -> Hierarchy {
    Hierarchy::new(&compass.login())
}

#[test]
fn units_below_a_district() {
    let compass = FakeCompass::start();
    let groups = hierarchy(&compass)
        .units(100, HierarchyEndpoint::Groups)
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].id, 200);
    assert_eq!(groups[0].name, "1st Town");
    assert_eq!(groups[0].parent_id, Some(100));
    assert_eq!(groups[0].status.as_deref(), Some("Active"));
    assert_eq!(groups[0].member_count, Some(12));
    assert_eq!(groups[0].section_type, None);
}

#[test]
fn sections_carry_their_type() {
    let compass = FakeCompass::start();
    let sections = hierarchy(&compass)
        .units(200, HierarchyEndpoint::GroupSections)
        .unwrap();
    let types: Vec<_> = sections
        .iter()
        .map(|s| s.section_type.as_deref().unwrap_or_default())
        .collect();
    assert_eq!(types, vec!["Beavers", "Cubs"]);
}

#[test]
fn denied_units_are_a_permission_error() {
    let compass = FakeCompass::start();
    let err = hierarchy(&compass)
        .units(FORBIDDEN_UNIT, HierarchyEndpoint::Groups)
        .unwrap_err();
    assert!(matches!(err, CompassError::Permission(_)));
}

#[test]
fn tree_walks_every_level() {
    let compass = FakeCompass::start();
    let tree = hierarchy(&compass).tree(100, UnitLevel::District).unwrap();

    assert_eq!(tree.name, "100");
    assert_eq!(tree.level, UnitLevel::District);
    assert_eq!(tree.sections.len(), 1);
    assert_eq!(tree.children.len(), 2);

    let first_group = &tree.children[0];
    assert_eq!(first_group.name, "1st Town");
    assert_eq!(first_group.level, UnitLevel::Group);
    assert_eq!(first_group.sections.len(), 2);
    assert!(first_group.children.is_empty());
    assert!(tree.children[1].sections.is_empty());

    assert_eq!(tree.unit_ids(), vec![100, 101, 200, 201, 202, 300]);
}

#[test]
fn unit_ids_of_a_group() {
    let compass = FakeCompass::start();
    let ids = hierarchy(&compass).unit_ids(200, UnitLevel::Group).unwrap();
    assert_eq!(ids, vec![200, 201, 202]);
}

#[test]
fn members_in_a_unit() {
    let compass = FakeCompass::start();
    let members = hierarchy(&compass).members_in_unit(201).unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(members[0].contact_number, 201000);
    assert_eq!(members[0].name, "Leader of 201");
    assert_eq!(members[0].extra["email"], "leader201@example.com");
    for member in &members {
        assert!(!member.extra.contains_key("role"));
        assert!(!member.extra.contains_key("address"));
        assert!(!member.extra.contains_key("visibility_status"));
    }
    assert_eq!(compass.with_state(|s| s.search_unit), Some(201));
}

#[test]
fn empty_and_failed_searches() {
    let compass = FakeCompass::start();
    let hierarchy = hierarchy(&compass);
    assert!(hierarchy.members_in_unit(300).unwrap().is_empty());

    let err = hierarchy.members_in_unit(BROKEN_UNIT).unwrap_err();
    assert!(matches!(err, CompassError::Compass(ref msg) if msg == "Invalid Search"));
}

#[test]
fn members_of_many_units() {
    let compass = FakeCompass::start();
    let outcome = unit_members(&hierarchy(&compass), vec![201, BROKEN_UNIT, 202, 300]);

    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.results[&202][1].contact_number, 202001);
    assert!(outcome.results[&300].is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].0, BROKEN_UNIT);
}
