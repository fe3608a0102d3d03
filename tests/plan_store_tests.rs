use chrono::NaiveDate;
use weekplan::holidays::LegalHolidayMap;
use weekplan::{
    CellEntry, CellKey, Document, EditError, IsoWeek, Placement, PlanStore, Planner,
    PublicHoliday, StateCode, Week,
};

fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn key(day: u8, slot: u8) -> CellKey {
    CellKey::new(day, slot).unwrap()
}

fn week(year: i32, week: i64) -> IsoWeek {
    IsoWeek::new(year, week)
}

#[test]
fn cell_keys_are_validated() {
    assert!(CellKey::new(0, 0).is_none());
    assert!(CellKey::new(6, 0).is_none());
    assert!(CellKey::new(1, 4).is_none());
    assert_eq!(key(3, 2).to_string(), "3-2");
    assert_eq!("5-3".parse::<CellKey>(), Ok(key(5, 3)));
    assert!("5-4".parse::<CellKey>().is_err());
    assert_eq!(CellKey::all().count(), 20);
}

#[test]
fn entries_are_copied_and_empty_removes_the_cell() {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    let subject = store.add_subject("Mathe", "", "").unwrap();
    let entry = CellEntry::subject(subject.clone()).with_room("A1");

    store
        .set_entries(&plan_id, week(2025, 5), 2, &[0, 1, 3], &entry)
        .unwrap();
    assert_eq!(store.entry(&plan_id, week(2025, 5), key(2, 1)), entry);
    assert_eq!(store.entry(&plan_id, week(2025, 5), key(2, 2)), CellEntry::Empty);

    store
        .set_entry(&plan_id, week(2025, 5), key(2, 1), CellEntry::subject(subject).with_room("B2"))
        .unwrap();
    assert_eq!(store.entry(&plan_id, week(2025, 5), key(2, 0)), entry);

    store
        .set_entry(&plan_id, week(2025, 5), key(2, 0), CellEntry::Empty)
        .unwrap();
    let stored = store.peek_week(&plan_id, week(2025, 5)).unwrap();
    assert!(!stored.cells.contains_key("2-0"));
    assert_eq!(stored.cells.len(), 2);
}

#[test]
fn week_records_are_created_lazily_and_cleared() {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    assert!(store.peek_week(&plan_id, week(2025, 20)).is_none());
    assert_eq!(store.entry(&plan_id, week(2025, 20), key(1, 0)), CellEntry::Empty);
    assert!(store.peek_week(&plan_id, week(2025, 20)).is_none());

    store.set_note(&plan_id, week(2025, 20), "Projektwoche").unwrap();
    store.set_class_reps(&plan_id, week(2025, 20), "Ada, Ben").unwrap();
    store.set_qn_owner(&plan_id, week(2025, 20), "KR").unwrap();
    let stored = store.peek_week(&plan_id, week(2025, 20)).unwrap();
    assert_eq!(stored.note, "Projektwoche");
    assert_eq!(stored.class_reps, "Ada, Ben");
    assert_eq!(stored.qn_owner, "KR");

    assert!(store.clear_week(&plan_id, week(2025, 20)).unwrap());
    assert!(!store.clear_week(&plan_id, week(2025, 20)).unwrap());
    assert_eq!(
        store.set_note("nope", week(2025, 20), "x"),
        Err(EditError::UnknownPlan("nope".to_string()))
    );
}

#[test]
fn deleting_a_teacher_clears_every_reference() {
    let mut store = PlanStore::default();
    let first = store.active_plan_id().to_string();
    let teacher = store.add_teacher("Frau Krause", "KR").unwrap();
    let other = store.add_teacher("Herr Berg", "BG").unwrap();
    let subject = store.add_subject("Mathe", "#123456", &teacher).unwrap();
    let special = store.add_special("Wandertag", "").unwrap();
    store.set_plan_leader(&first, &teacher).unwrap();
    let second = store.add_plan("Klasse 8b");

    for plan_id in [&first, &second] {
        store
            .set_entry(plan_id, week(2025, 3), key(1, 0), CellEntry::subject(&subject).with_teacher(&teacher))
            .unwrap();
        store
            .set_entry(plan_id, week(2025, 4), key(5, 3), CellEntry::special(&special).with_teacher(&teacher))
            .unwrap();
        store
            .set_entry(plan_id, week(2025, 4), key(4, 3), CellEntry::special(&special).with_teacher(&other))
            .unwrap();
    }

    store.delete_teacher(&teacher).unwrap();

    let doc = store.document();
    assert!(doc.teacher(&teacher).is_none());
    assert!(doc.subject(&subject).unwrap().default_teacher_id.is_empty());
    for plan in doc.plans.values() {
        assert!(plan.leader_id.is_empty());
        for week in plan.weeks.values() {
            for entry in week.cells.values() {
                assert_ne!(entry.teacher_id(), Some(teacher.as_str()));
            }
        }
    }
    assert_eq!(
        store.entry(&first, week(2025, 3), key(1, 0)),
        CellEntry::subject(&subject)
    );
    assert_eq!(
        store.entry(&second, week(2025, 4), key(4, 3)).teacher_id(),
        Some(other.as_str())
    );
    assert!(matches!(
        store.delete_teacher(&teacher),
        Err(EditError::UnknownEntity { kind: "teacher", .. })
    ));
}

#[test]
fn deleting_a_subject_or_special_removes_its_cells() {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    let math = store.add_subject("Mathe", "", "").unwrap();
    let art = store.add_subject("Kunst", "", "").unwrap();
    let trip = store.add_special("Ausflug", "").unwrap();
    store.set_entry(&plan_id, week(2025, 9), key(1, 0), CellEntry::subject(&math)).unwrap();
    store.set_entry(&plan_id, week(2025, 9), key(1, 1), CellEntry::subject(&art)).unwrap();
    store.set_entry(&plan_id, week(2025, 10), key(2, 0), CellEntry::special(&trip)).unwrap();
    store.toggle_placement(Placement::Subject(math.clone())).unwrap();

    store.delete_subject(&math).unwrap();
    assert_eq!(store.entry(&plan_id, week(2025, 9), key(1, 0)), CellEntry::Empty);
    assert_eq!(store.entry(&plan_id, week(2025, 9), key(1, 1)), CellEntry::subject(&art));
    assert!(store.placement().is_none());

    store.delete_special(&trip).unwrap();
    assert_eq!(store.entry(&plan_id, week(2025, 10), key(2, 0)), CellEntry::Empty);
}

#[test]
fn removing_the_last_plan_leaves_a_fresh_one() {
    let mut store = PlanStore::default();
    let only = store.active_plan_id().to_string();
    store.rename_plan(&only, "  Klasse 9  ").unwrap();
    assert_eq!(store.plan(&only).unwrap().name, "Klasse 9");
    assert_eq!(store.rename_plan(&only, "  "), Err(EditError::MissingField("plan name")));

    store.delete_plan(&only).unwrap();
    let doc = store.document();
    assert_eq!(doc.plans.len(), 1);
    let fresh = store.active_plan().unwrap();
    assert_ne!(fresh.id, only);
    assert_eq!(fresh.name, "Klasse");
    assert!(fresh.weeks.is_empty());
}

#[test]
fn plans_can_be_added_switched_and_deleted() {
    let mut store = PlanStore::default();
    let first = store.active_plan_id().to_string();
    let second = store.add_plan("");
    assert_eq!(store.active_plan_id(), second);
    assert_eq!(store.plan(&second).unwrap().name, "Klasse");

    store.set_active_plan(&first).unwrap();
    assert_eq!(store.active_plan_id(), first);
    assert!(store.set_active_plan("missing").is_err());

    store.delete_plan(&first).unwrap();
    assert_eq!(store.active_plan_id(), second);
    assert!(store.set_plan_leader(&second, "ghost").is_err());
}

#[test]
fn placement_uses_the_subject_default_teacher_and_toggles() {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    let teacher = store.add_teacher("Frau Krause", "KR").unwrap();
    let subject = store.add_subject("Mathe", "", &teacher).unwrap();

    assert!(!store.apply_placement(&plan_id, week(2025, 12), key(1, 0), true).unwrap());
    assert!(store.toggle_placement(Placement::Subject(subject.clone())).unwrap());
    assert!(store.apply_placement(&plan_id, week(2025, 12), key(1, 0), true).unwrap());
    assert!(store.apply_placement(&plan_id, week(2025, 12), key(1, 1), false).unwrap());
    assert!(store.placement().is_none());
    assert_eq!(
        store.entry(&plan_id, week(2025, 12), key(1, 1)),
        CellEntry::subject(&subject).with_teacher(&teacher)
    );

    assert!(store.toggle_placement(Placement::Subject(subject.clone())).unwrap());
    assert!(!store.toggle_placement(Placement::Subject(subject)).unwrap());
    assert!(store.toggle_placement(Placement::Special("nope".into())).is_err());
}

#[test]
fn entity_input_is_validated() {
    let mut store = PlanStore::default();
    assert_eq!(store.add_teacher("  ", "X"), Err(EditError::MissingField("teacher name")));
    assert!(store.add_subject("Bio", "", "ghost").is_err());
    let special = store.add_special("Sport", "").unwrap();
    assert_eq!(store.document().special(&special).unwrap().color, "#ffb86b");
    store.update_special(&special, "Sportfest", "#111111").unwrap();
    assert_eq!(store.document().special(&special).unwrap().title, "Sportfest");
}

#[test]
fn settings_editors_normalize_their_input() {
    let mut store = PlanStore::default();
    store.set_slot_label(1, "  ").unwrap();
    store.set_slot_label(0, "08:00 - 09:30").unwrap();
    store.set_pause_label(0, "Pause: Hof").unwrap();
    assert!(store.set_slot_label(4, "x").is_err());
    assert!(!store.set_accent("pink"));
    assert!(store.set_accent("wine"));

    let settings = &store.document().settings;
    assert_eq!(settings.slot_labels[0], "08:00 - 09:30");
    assert_eq!(settings.slot_labels[1], "Block 2");
    assert_eq!(settings.pause_labels[0], "Hof");
    assert_eq!(settings.accent_key.as_str(), "wine");
}

fn planner_on(date: NaiveDate) -> Planner {
    Planner::new(Document::default(), date)
}

fn unity_day() -> LegalHolidayMap {
    [PublicHoliday {
        date: d(2025, 10, 3),
        name: "Tag der Deutschen Einheit".to_string(),
    }]
    .into_iter()
    .collect()
}

#[test]
fn public_holidays_lock_their_day_only() {
    let mut planner = planner_on(d(2025, 10, 1));
    assert_eq!(planner.view().iso.key(), "2025-W40");
    assert!(planner.apply_legal_map(StateCode::Berlin, &[2025], unity_day()));
    let subject = planner.edit(|s| s.add_subject("Mathe", "", "")).unwrap();

    let err = planner
        .set_entry(key(5, 0), CellEntry::subject(&subject))
        .unwrap_err();
    assert_eq!(
        err,
        EditError::DayLocked {
            date: d(2025, 10, 3),
            name: "Tag der Deutschen Einheit".to_string()
        }
    );
    assert!(err.to_string().contains("Tag der Deutschen Einheit"));
    assert!(planner.set_entries(5, &[0, 1], &CellEntry::subject(&subject)).is_err());
    planner.set_entry(key(4, 0), CellEntry::subject(&subject)).unwrap();

    let locks = planner.day_locks();
    assert_eq!(locks[4].as_deref(), Some("Tag der Deutschen Einheit"));
    assert!(locks[..4].iter().all(Option::is_none));
    assert_eq!(planner.week_view().day_locks, locks);

    planner.shift_week(1);
    planner.set_entry(key(5, 0), CellEntry::subject(&subject)).unwrap();
}

#[test]
fn stale_public_holiday_maps_are_discarded() {
    let mut planner = planner_on(d(2025, 10, 1));
    let requested = planner.displayed_years();
    planner.go_to(2026, 1);
    assert_eq!(planner.displayed_years(), vec![2025, 2026]);
    assert!(!planner.apply_legal_map(StateCode::Berlin, &requested, unity_day()));
    assert!(planner.legal_map().is_empty());
}

#[test]
fn navigating_to_other_years_clears_locks() {
    let mut planner = planner_on(d(2025, 10, 1));
    planner.apply_legal_map(StateCode::Berlin, &[2025], unity_day());
    planner.go_to(2025, 40);
    assert!(planner.check_day(5).is_err());
    planner.go_to(2026, 40);
    assert!(planner.legal_map().is_empty());
    assert!(planner.check_day(5).is_ok());
}

#[test]
fn planner_import_rejects_non_json_and_merges() {
    let mut planner = planner_on(d(2025, 1, 15));
    let before = planner.document().clone();
    assert!(matches!(
        planner.import_json("definitely not json", weekplan::ImportMode::Merge),
        Err(EditError::InvalidImport(_))
    ));
    assert_eq!(planner.document(), &before);

    planner
        .import_json(
            r#"{"teachers":[{"id":"t9","name":"Import"}],"settings":{"stateCode":"BB"},
                "weeks":{"2025-W03":{"note":"Legacy"}}}"#,
            weekplan::ImportMode::Merge,
        )
        .unwrap();
    let doc = planner.document();
    assert!(doc.teacher("t9").is_some());
    assert_eq!(doc.plans.len(), 1);
    let active = &doc.plans[&doc.settings.active_plan_id];
    assert_eq!(active.id, before.settings.active_plan_id);
    assert_eq!(active.weeks["2025-W03"].note, "Legacy");
    assert!(planner.is_dirty());
}

#[test]
fn plan_less_merges_never_add_plans() {
    let mut planner = planner_on(d(2025, 1, 15));
    let legacy = r#"{"weeks":{"2025-W03":{"cells":{"1-0":{"specialId":"x"}},"note":"Alt"}}}"#;
    planner.import_json(legacy, weekplan::ImportMode::Merge).unwrap();
    planner.import_json(legacy, weekplan::ImportMode::Merge).unwrap();
    let doc = planner.document();
    assert_eq!(doc.plans.len(), 1);
    assert_eq!(doc.plans.values().next().unwrap().weeks["2025-W03"].note, "Alt");
}

#[test]
fn public_holidays_of_another_state_are_discarded() {
    let mut planner = planner_on(d(2025, 10, 1));
    let requested = planner.displayed_years();
    planner.set_state(StateCode::Brandenburg);
    assert!(!planner.apply_legal_map(StateCode::Berlin, &requested, unity_day()));
    assert!(planner.legal_map().is_empty());
    assert!(planner.check_day(5).is_ok());

    assert!(planner.apply_legal_map(StateCode::Brandenburg, &requested, unity_day()));
    planner.set_state(StateCode::Berlin);
    assert!(planner.legal_map().is_empty());
}

#[test]
fn cells_must_refer_to_known_entities() {
    let mut store = PlanStore::default();
    let plan_id = store.active_plan_id().to_string();
    let subject = store.add_subject("Mathe", "", "").unwrap();

    assert_eq!(
        store.set_entry(&plan_id, week(2025, 6), key(1, 0), CellEntry::subject("ghost")),
        Err(EditError::UnknownReference {
            kind: "subject",
            id: "ghost".to_string()
        })
    );
    assert!(matches!(
        store.set_entry(&plan_id, week(2025, 6), key(1, 0), CellEntry::special("nope")),
        Err(EditError::UnknownReference { kind: "special", .. })
    ));
    let err = store
        .set_entries(&plan_id, week(2025, 6), 2, &[0, 1], &CellEntry::subject(&subject).with_teacher("t9"))
        .unwrap_err();
    assert_eq!(err.to_string(), "cell refers to unknown teacher 't9'");
    assert!(store.peek_week(&plan_id, week(2025, 6)).is_none());

    store
        .set_entry(&plan_id, week(2025, 6), key(1, 0), CellEntry::Empty)
        .unwrap();
}

#[test]
fn plan_edits_are_all_or_nothing() {
    let mut store = PlanStore::default();
    let first = store.active_plan_id().to_string();
    let teacher = store.add_teacher("Frau Krause", "KR").unwrap();

    assert!(matches!(
        store.create_plan("Klasse 8b", "ghost"),
        Err(EditError::UnknownEntity { kind: "teacher", .. })
    ));
    assert_eq!(store.document().plans.len(), 1);
    assert_eq!(store.active_plan_id(), first);

    let second = store.create_plan("Klasse 8b", &teacher).unwrap();
    assert_eq!(store.plan(&second).unwrap().leader_id, teacher);
    store.set_active_plan(&first).unwrap();

    assert!(store.update_plan(&second, Some("Klasse 9a"), Some("ghost"), true).is_err());
    assert!(store.update_plan(&second, Some("  "), Some(""), true).is_err());
    let plan = store.plan(&second).unwrap();
    assert_eq!(plan.name, "Klasse 8b");
    assert_eq!(plan.leader_id, teacher);
    assert_eq!(store.active_plan_id(), first);

    store.update_plan(&second, Some("Klasse 9a"), Some(""), true).unwrap();
    assert_eq!(store.plan(&second).unwrap().name, "Klasse 9a");
    assert!(store.plan(&second).unwrap().leader_id.is_empty());
    assert_eq!(store.active_plan_id(), second);
}

#[test]
fn deletes_reach_unmigrated_root_weeks() {
    let mut store = PlanStore::default();
    let teacher = store.add_teacher("Frau Krause", "KR").unwrap();
    let math = store.add_subject("Mathe", "", "").unwrap();
    let art = store.add_subject("Kunst", "", "").unwrap();

    let mut doc = store.into_document();
    let mut legacy = Week::default();
    legacy.cells.insert("1-0".into(), CellEntry::subject(&math));
    legacy.cells.insert("1-1".into(), CellEntry::subject(&art).with_teacher(&teacher));
    doc.weeks.insert("2024-W50".into(), legacy);
    let mut store = PlanStore::new(doc);

    store.delete_teacher(&teacher).unwrap();
    store.delete_subject(&math).unwrap();

    let cells = &store.document().weeks["2024-W50"].cells;
    assert!(!cells.contains_key("1-0"));
    assert_eq!(cells["1-1"], CellEntry::subject(&art));
}
