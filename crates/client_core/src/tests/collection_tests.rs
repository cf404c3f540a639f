use super::*;
use shared::domain::{SortDirection, SortField};

fn item(id: &str, name: &str, amount: i64, exp_date: &str, box_label: &str) -> Item {
    Item::draft(name, amount, exp_date, box_label).with_id(id)
}

fn flour() -> Item {
    item("1", "Flour", 2, "2024-01-01", "A")
}

fn sugar() -> Item {
    item("2", "Sugar", 5, "2023-06-01", "B")
}

fn by_expiration() -> SortPolicy {
    SortPolicy::new(SortField::ExpDate, SortDirection::Asc)
}

fn ids(collection: &SyncedItemCollection) -> Vec<&str> {
    collection
        .items()
        .iter()
        .filter_map(|i| i.id.as_ref().map(|id| id.as_str()))
        .collect()
}

fn primed_with_flour_and_sugar() -> SyncedItemCollection {
    let mut collection = SyncedItemCollection::new();
    let mut changes = Vec::new();
    collection
        .on_added(flour(), by_expiration(), &mut changes)
        .expect("flour");
    collection
        .on_added(sugar(), by_expiration(), &mut changes)
        .expect("sugar");
    collection
}

#[test]
fn add_appends_notifies_then_resorts() {
    let mut collection = SyncedItemCollection::new();
    let mut changes = Vec::new();

    assert_eq!(collection.on_added(flour(), by_expiration(), &mut changes), Ok(0));
    assert_eq!(collection.on_added(sugar(), by_expiration(), &mut changes), Ok(1));

    assert_eq!(
        changes,
        vec![
            ListChange::InsertedAt(0),
            ListChange::FullyReordered,
            ListChange::InsertedAt(1),
            ListChange::FullyReordered,
        ]
    );
    assert_eq!(ids(&collection), vec!["2", "1"]);
}

#[test]
fn distinct_adds_are_all_retrievable() {
    let mut collection = SyncedItemCollection::new();
    let mut changes = Vec::new();
    for n in 0..25 {
        let id = format!("item-{n}");
        collection
            .on_added(
                item(&id, "Rice", n, &format!("2024-01-{:02}", 28 - n), "C"),
                by_expiration(),
                &mut changes,
            )
            .expect("add");
    }

    assert_eq!(collection.len(), 25);
    for n in 0..25 {
        let id = ItemId::new(format!("item-{n}"));
        assert_eq!(collection.find(&id).map(|i| i.amount), Some(n));
    }
}

#[test]
fn duplicate_add_is_rejected_without_mutation() {
    let mut collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();
    let mut changes = Vec::new();

    let renamed = item("1", "Whole wheat flour", 9, "2022-01-01", "Z");
    assert_eq!(
        collection.on_added(renamed, by_expiration(), &mut changes),
        Err(CollectionError::DuplicateId(ItemId::from("1")))
    );
    assert_eq!(collection.items(), before.as_slice());
    assert!(changes.is_empty());
}

#[test]
fn missing_or_blank_id_is_rejected_without_mutation() {
    let mut collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();
    let mut changes = Vec::new();

    let draft = Item::draft("Salt", 1, "2025-01-01", "C");
    assert_eq!(
        collection.on_added(draft.clone(), by_expiration(), &mut changes),
        Err(CollectionError::MissingId { event: "added" })
    );
    assert_eq!(
        collection.on_changed(draft.clone().with_id(" "), by_expiration(), &mut changes),
        Err(CollectionError::MissingId { event: "changed" })
    );
    assert_eq!(
        collection.on_removed(&draft, by_expiration(), &mut changes),
        Err(CollectionError::MissingId { event: "removed" })
    );
    assert_eq!(
        collection.on_moved(&draft, None),
        Err(CollectionError::MissingId { event: "moved" })
    );

    assert_eq!(collection.items(), before.as_slice());
    assert!(changes.is_empty());
}

#[test]
fn change_replaces_fields_in_place() {
    let mut collection = primed_with_flour_and_sugar();
    let mut changes = Vec::new();
    let flour_row = collection.position_of(&ItemId::from("1")).expect("flour row");

    let restocked = item("1", "Flour", 7, "2024-01-01", "A");
    assert_eq!(
        collection.on_changed(restocked, by_expiration(), &mut changes),
        Ok(flour_row)
    );

    assert_eq!(
        changes,
        vec![ListChange::UpdatedAt(flour_row), ListChange::FullyReordered]
    );
    assert_eq!(collection.position_of(&ItemId::from("1")), Some(flour_row));
    assert_eq!(collection.find(&ItemId::from("1")).map(|i| i.amount), Some(7));
    assert_eq!(collection.find(&ItemId::from("2")), Some(&sugar()));
}

#[test]
fn change_that_alters_sort_key_is_reordered() {
    let mut collection = primed_with_flour_and_sugar();
    let mut changes = Vec::new();

    let later_sugar = item("2", "Sugar", 5, "2026-06-01", "B");
    collection
        .on_changed(later_sugar, by_expiration(), &mut changes)
        .expect("change");
    assert_eq!(ids(&collection), vec!["1", "2"]);
}

#[test]
fn change_for_unknown_id_is_not_found() {
    let mut collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();
    let mut changes = Vec::new();

    assert_eq!(
        collection.on_changed(item("9", "Oats", 1, "2024-02-02", "D"), by_expiration(), &mut changes),
        Err(CollectionError::NotFound(ItemId::from("9")))
    );
    assert_eq!(collection.items(), before.as_slice());
    assert!(changes.is_empty());
}

#[test]
fn remove_matches_by_value_and_reports_found_index() {
    let mut collection = primed_with_flour_and_sugar();
    let mut changes = Vec::new();
    let flour_row = collection.position_of(&ItemId::from("1")).expect("flour row");

    assert_eq!(
        collection.on_removed(&flour(), by_expiration(), &mut changes),
        Ok(Some(flour_row))
    );
    assert_eq!(
        changes,
        vec![ListChange::RemovedAt(flour_row), ListChange::FullyReordered]
    );
    assert_eq!(ids(&collection), vec!["2"]);
}

#[test]
fn remove_matching_nothing_is_a_silent_no_op() {
    let mut collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();
    let mut changes = Vec::new();

    let unknown = item("3", "Salt", 1, "2025-01-01", "C");
    assert_eq!(collection.on_removed(&unknown, by_expiration(), &mut changes), Ok(None));

    // Same id, stale fields: still no match.
    let drifted = item("1", "Flour", 99, "2024-01-01", "A");
    assert_eq!(collection.on_removed(&drifted, by_expiration(), &mut changes), Ok(None));

    assert_eq!(collection.items(), before.as_slice());
    assert!(changes.is_empty());
}

#[test]
fn add_then_remove_restores_membership() {
    let mut collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();
    let mut changes = Vec::new();

    let salt = item("3", "Salt", 1, "2023-01-01", "C");
    collection
        .on_added(salt.clone(), by_expiration(), &mut changes)
        .expect("add");
    assert_eq!(collection.len(), 3);
    collection
        .on_removed(&salt, by_expiration(), &mut changes)
        .expect("remove");

    assert_eq!(collection.items(), before.as_slice());
}

#[test]
fn move_is_validated_but_never_reorders() {
    let collection = primed_with_flour_and_sugar();
    let before = collection.items().to_vec();

    assert_eq!(collection.on_moved(&flour(), Some(&ItemId::from("2"))), Ok(()));
    assert_eq!(collection.items(), before.as_slice());
}

#[test]
fn resort_always_notifies_full_reorder() {
    let mut collection = primed_with_flour_and_sugar();
    let mut changes = Vec::new();

    assert!(!collection.resort(by_expiration(), &mut changes));
    assert!(collection.resort(
        SortPolicy::new(SortField::Box, SortDirection::Asc),
        &mut changes
    ));
    assert_eq!(
        changes,
        vec![ListChange::FullyReordered, ListChange::FullyReordered]
    );
    assert_eq!(ids(&collection), vec!["1", "2"]);
}

#[test]
fn phase_goes_live_once_and_clear_resets_it() {
    let mut collection = primed_with_flour_and_sugar();
    assert_eq!(collection.phase(), SyncPhase::Priming);

    assert!(collection.mark_live());
    assert!(!collection.mark_live());
    assert_eq!(collection.phase(), SyncPhase::Live);

    collection.clear();
    assert!(collection.is_empty());
    assert_eq!(collection.phase(), SyncPhase::Priming);
}
