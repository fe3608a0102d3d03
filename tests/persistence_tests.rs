use serde_json::json;
use tempfile::tempdir;
use weekplan::holidays::HolidayCache;
use weekplan::persistence::{
    self, DOCUMENT_KEY, DirectoryStore, LEGACY_DOCUMENT_KEY, LEGAL_CACHE_KEY,
    export_document_json, import_document_json, write_week_csv,
};
use weekplan::{
    CellEntry, CellKey, HolidayService, IsoWeek, PersistenceError, PlanStore, PlannerConfig,
    PlannerStore, PublicHoliday, StateCode, StorageBackend,
};

fn sample_store() -> PlanStore {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    let teacher = store.add_teacher("Frau Krause", "KR").unwrap();
    let math = store.add_subject("Mathe", "", &teacher).unwrap();
    let trip = store.add_special("Wandertag", "").unwrap();
    let iso = IsoWeek::new(2025, 10);
    store
        .set_entry(&plan_id, iso, CellKey::new(1, 0).unwrap(), CellEntry::subject(&math).with_teacher(&teacher))
        .unwrap();
    store
        .set_entry(&plan_id, iso, CellKey::new(3, 2).unwrap(), CellEntry::special(&trip))
        .unwrap();
    store.set_note(&plan_id, iso, "Elternabend").unwrap();
    store
}

#[test]
fn directory_store_reads_writes_and_removes() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::new(dir.path().join("nested")).unwrap();
    assert_eq!(store.read("weekplan.document.v2").unwrap(), None);

    store.write("weekplan.document.v2", "{\"a\":1}").unwrap();
    assert!(store.root().join("weekplan.document.v2.json").exists());
    assert_eq!(store.read("weekplan.document.v2").unwrap().as_deref(), Some("{\"a\":1}"));

    store.remove("weekplan.document.v2").unwrap();
    store.remove("weekplan.document.v2").unwrap();
    assert_eq!(store.read("weekplan.document.v2").unwrap(), None);

    assert!(matches!(
        store.write("../escape", "x"),
        Err(PersistenceError::InvalidData(_))
    ));
}

#[test]
fn saved_documents_load_back_equal() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::new(dir.path()).unwrap();
    let mut doc = sample_store().into_document();
    let before = doc.updated_at;

    persistence::save_document(&store, &mut doc).unwrap();
    assert!(doc.updated_at >= before);
    let loaded = persistence::load_document(&store);
    assert_eq!(loaded, doc);
}

#[test]
fn load_falls_back_to_the_legacy_key_then_defaults() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::new(dir.path()).unwrap();

    let fresh = persistence::load_document(&store);
    assert_eq!(fresh.plans.len(), 1);

    store
        .write(
            LEGACY_DOCUMENT_KEY,
            &json!({"weeks": {"2024-W40": {"note": "alt"}}}).to_string(),
        )
        .unwrap();
    let migrated = persistence::load_document(&store);
    let plan = migrated.active_plan().unwrap();
    assert_eq!(plan.name, "AVöD I");
    assert_eq!(plan.weeks["2024-W40"].note, "alt");

    store.write(DOCUMENT_KEY, "{ this is not json").unwrap();
    let recovered = persistence::load_document(&store);
    assert_eq!(recovered.active_plan().unwrap().name, "AVöD I");
}

#[test]
fn json_export_import_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("export.json");
    let doc = sample_store().into_document();
    export_document_json(&doc, &path).unwrap();
    let imported = import_document_json(&path).unwrap();
    assert_eq!(imported, doc);

    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "<html>").unwrap();
    assert!(matches!(
        import_document_json(&bad),
        Err(PersistenceError::InvalidData(_))
    ));
}

#[test]
fn week_csv_has_one_row_per_block() {
    let doc = sample_store().into_document();
    let mut out = Vec::new();
    write_week_csv(&doc, &doc.settings.active_plan_id, IsoWeek::new(2025, 10), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "2025-W10,Mo 03.03.,Di 04.03.,Mi 05.03.,Do 06.03.,Fr 07.03.");
    assert_eq!(lines[1], "Block 1,Mathe (KR),,,,");
    assert_eq!(lines[3], "Block 3,,,Wandertag,,");

    let err = write_week_csv(&doc, "missing", IsoWeek::new(2025, 10), Vec::new()).unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));
}

#[test]
fn holiday_caches_survive_a_restart() {
    let dir = tempdir().unwrap();
    let store = DirectoryStore::new(dir.path()).unwrap();
    let mut legal = HolidayCache::new();
    legal.put(
        StateCode::Berlin,
        2025,
        vec![PublicHoliday {
            date: chrono::NaiveDate::from_ymd_opt(2025, 10, 3).unwrap(),
            name: "Tag der Deutschen Einheit".into(),
        }],
    );
    let service = HolidayService::offline(HolidayCache::new(), legal);
    persistence::save_holiday_caches(&store, &service).unwrap();
    assert!(store.read(LEGAL_CACHE_KEY).unwrap().is_some());

    let reloaded = persistence::load_legal_cache(&store);
    assert_eq!(reloaded.get(StateCode::Berlin, 2025).unwrap().len(), 1);
    assert!(persistence::load_school_cache(&store).is_empty());
}

#[test]
fn open_store_honours_the_configured_backend() {
    let dir = tempdir().unwrap();
    let mut config = PlannerConfig {
        data_dir: dir.path().join("data"),
        ..PlannerConfig::default()
    };
    let store = persistence::open_store(&config).unwrap();
    store.write("marker", "1").unwrap();
    assert!(dir.path().join("data").join("marker.json").exists());

    config.backend = StorageBackend::Sqlite;
    let result = persistence::open_store(&config);
    if cfg!(feature = "sqlite") {
        let store = result.unwrap();
        store.write("marker", "2").unwrap();
        assert_eq!(store.read("marker").unwrap().as_deref(), Some("2"));
        assert!(dir.path().join("data").join("weekplan.sqlite3").exists());
    } else {
        assert!(result.is_err());
    }
}
