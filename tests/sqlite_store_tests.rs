#![cfg(feature = "sqlite")]

use tempfile::NamedTempFile;
use weekplan::persistence::{self, DOCUMENT_KEY, SqliteStore};
use weekplan::{CellEntry, CellKey, IsoWeek, PlanStore, PlannerStore};

#[test]
fn sqlite_store_round_trip_document() {
    let file = NamedTempFile::new().unwrap();
    let store = SqliteStore::new(file.path()).unwrap();

    let mut plans = PlanStore::default();
    let plan_id = plans.active_plan_id().to_string();
    let subject = plans.add_subject("Deutsch", "#aa0000", "").unwrap();
    plans
        .set_entry(
            &plan_id,
            IsoWeek::new(2025, 2),
            CellKey::new(2, 1).unwrap(),
            CellEntry::subject(&subject).with_room("104"),
        )
        .unwrap();
    let mut doc = plans.into_document();
    persistence::save_document(&store, &mut doc).expect("save document");

    // reopen to make sure the data hit the file
    drop(store);
    let reopened = SqliteStore::new(file.path()).unwrap();
    let loaded = persistence::load_document(&reopened);
    assert_eq!(loaded, doc);
    assert_eq!(
        loaded.plans[&plan_id].weeks["2025-W02"].cells["2-1"],
        CellEntry::subject(&subject).with_room("104")
    );
}

#[test]
fn sqlite_store_upserts_and_removes_keys() {
    let store = SqliteStore::in_memory().unwrap();
    assert_eq!(store.read(DOCUMENT_KEY).unwrap(), None);
    store.write(DOCUMENT_KEY, "first").unwrap();
    store.write(DOCUMENT_KEY, "second").unwrap();
    assert_eq!(store.read(DOCUMENT_KEY).unwrap().as_deref(), Some("second"));
    store.remove(DOCUMENT_KEY).unwrap();
    store.remove(DOCUMENT_KEY).unwrap();
    assert_eq!(store.read(DOCUMENT_KEY).unwrap(), None);
}

#[test]
fn corrupted_rows_load_as_a_fresh_document() {
    let store = SqliteStore::in_memory().unwrap();
    store.write(DOCUMENT_KEY, "[[[").unwrap();
    let doc = persistence::load_document(&store);
    assert_eq!(doc.plans.len(), 1);
    assert_eq!(doc.active_plan().unwrap().name, "Klasse");
}
