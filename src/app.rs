//! The application state object: document, displayed week and the public
//! holiday map that decides which days are locked.

use crate::calendar::{IsoWeek, SCHOOL_DAYS, WeekDates};
use crate::holidays::LegalHolidayMap;
use crate::migrate::{self, ImportMode};
use crate::model::{CellEntry, CellKey, Document, StateCode, Week};
use crate::store::{EditError, EditResult, PlanStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What is currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub iso: IsoWeek,
    pub state: StateCode,
}

/// Read model of the displayed week of the active plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub key: String,
    pub plan_id: String,
    pub plan_name: String,
    pub state: StateCode,
    pub dates: WeekDates,
    pub slot_labels: Vec<String>,
    pub cells: BTreeMap<String, CellEntry>,
    pub note: String,
    pub class_reps: String,
    pub qn_owner: String,
    pub day_locks: [Option<String>; SCHOOL_DAYS],
}

pub struct Planner {
    store: PlanStore,
    view: ViewState,
    legal: LegalHolidayMap,
    legal_key: Option<(StateCode, Vec<i32>)>,
    dirty: bool,
}

/// Rejects edits on a public holiday of `iso`, judged by `legal`.
fn check_locked(legal: &LegalHolidayMap, iso: IsoWeek, day: u8) -> EditResult<()> {
    let date = usize::from(day)
        .checked_sub(1)
        .and_then(|idx| iso.dates().days.get(idx).copied())
        .ok_or(EditError::InvalidCell { day, slot: 0 })?;
    match legal.name_for(date) {
        Some(name) => Err(EditError::DayLocked {
            date,
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

impl Planner {
    /// Start on the week containing `today`.
    pub fn new(doc: Document, today: NaiveDate) -> Self {
        let state = doc.settings.state_code;
        Self {
            store: PlanStore::new(doc),
            view: ViewState {
                iso: IsoWeek::containing(today),
                state,
            },
            legal: LegalHolidayMap::default(),
            legal_key: None,
            dirty: false,
        }
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    pub fn document(&self) -> &Document {
        self.store.document()
    }

    /// Run a store mutation and mark the document for saving.
    pub fn edit<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut PlanStore) -> R,
    {
        self.dirty = true;
        f(&mut self.store)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether there were unsaved changes, clearing the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn document_for_save(&mut self) -> &mut Document {
        self.store.document_mut()
    }

    // Navigation

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn dates(&self) -> WeekDates {
        self.view.iso.dates()
    }

    /// Calendar years touched by the displayed Monday..Friday.
    pub fn displayed_years(&self) -> Vec<i32> {
        self.dates().years()
    }

    /// Show `(year, week)`, clamping the week into the year's range.
    pub fn go_to(&mut self, year: i32, week: i64) -> IsoWeek {
        self.show(IsoWeek::new(year, week))
    }

    pub fn go_to_date(&mut self, date: NaiveDate) -> IsoWeek {
        self.show(IsoWeek::containing(date))
    }

    pub fn shift_week(&mut self, delta: i64) -> IsoWeek {
        self.show(self.view.iso.shifted(delta))
    }

    fn show(&mut self, iso: IsoWeek) -> IsoWeek {
        self.view.iso = iso;
        if !self.legal_matches_view() {
            self.drop_legal_map();
        }
        iso
    }

    pub fn set_state(&mut self, state: StateCode) {
        self.view.state = state;
        if !self.legal_matches_view() {
            self.drop_legal_map();
        }
        self.edit(|store| store.set_state_code(state));
    }

    fn legal_matches_view(&self) -> bool {
        self.legal_key.as_ref().is_some_and(|(state, years)| {
            *state == self.view.state && *years == self.displayed_years()
        })
    }

    fn drop_legal_map(&mut self) {
        self.legal = LegalHolidayMap::default();
        self.legal_key = None;
    }

    // Public holidays

    pub fn legal_map(&self) -> &LegalHolidayMap {
        &self.legal
    }

    /// Install a map fetched for `state` and `requested_years`. A response for
    /// another state or for years no longer displayed is stale and discarded;
    /// returns whether it was installed.
    pub fn apply_legal_map(
        &mut self,
        state: StateCode,
        requested_years: &[i32],
        map: LegalHolidayMap,
    ) -> bool {
        let displayed = self.displayed_years();
        if state != self.view.state || requested_years != displayed.as_slice() {
            debug!(
                requested_state = %state,
                displayed_state = %self.view.state,
                ?requested_years,
                ?displayed,
                "discarding public holidays for a week no longer displayed"
            );
            return false;
        }
        self.legal = map;
        self.legal_key = Some((state, displayed));
        true
    }

    pub fn day_locks(&self) -> [Option<String>; SCHOOL_DAYS] {
        self.legal.day_locks(&self.dates())
    }

    /// Rejects edits on a public holiday of the displayed week.
    pub fn check_day(&self, day: u8) -> EditResult<()> {
        check_locked(&self.legal, self.view.iso, day)
    }

    // Cells of the displayed week in the active plan

    fn active_plan_id(&self) -> String {
        self.store.active_plan_id().to_string()
    }

    pub fn entry(&self, key: CellKey) -> CellEntry {
        self.store
            .entry(self.store.active_plan_id(), self.view.iso, key)
    }

    /// Reading the current week creates its record.
    pub fn current_week(&mut self) -> EditResult<&mut Week> {
        let plan_id = self.active_plan_id();
        self.dirty = true;
        self.store.week_mut(&plan_id, self.view.iso)
    }

    pub fn set_entry(&mut self, key: CellKey, entry: CellEntry) -> EditResult<()> {
        self.check_day(key.day())?;
        self.write_entry(self.view.iso, key, entry)
    }

    /// Edit a cell of `iso` regardless of the displayed week. `legal` must
    /// hold the public holidays of the years `iso` touches.
    pub fn set_entry_at(
        &mut self,
        iso: IsoWeek,
        key: CellKey,
        entry: CellEntry,
        legal: &LegalHolidayMap,
    ) -> EditResult<()> {
        check_locked(legal, iso, key.day())?;
        self.write_entry(iso, key, entry)
    }

    fn write_entry(&mut self, iso: IsoWeek, key: CellKey, entry: CellEntry) -> EditResult<()> {
        let plan_id = self.active_plan_id();
        self.edit(|store| store.set_entry(&plan_id, iso, key, entry))
    }

    pub fn set_entries(&mut self, day: u8, slots: &[u8], entry: &CellEntry) -> EditResult<()> {
        self.check_day(day)?;
        let plan_id = self.active_plan_id();
        let iso = self.view.iso;
        self.edit(|store| store.set_entries(&plan_id, iso, day, slots, entry))
    }

    pub fn apply_placement(&mut self, key: CellKey, keep: bool) -> EditResult<bool> {
        self.check_day(key.day())?;
        let plan_id = self.active_plan_id();
        let iso = self.view.iso;
        self.edit(|store| store.apply_placement(&plan_id, iso, key, keep))
    }

    pub fn clear_week(&mut self) -> EditResult<bool> {
        self.clear_week_at(self.view.iso)
    }

    pub fn clear_week_at(&mut self, iso: IsoWeek) -> EditResult<bool> {
        let plan_id = self.active_plan_id();
        self.edit(|store| store.clear_week(&plan_id, iso))
    }

    pub fn set_note(&mut self, text: &str) -> EditResult<()> {
        self.set_note_at(self.view.iso, text)
    }

    pub fn set_note_at(&mut self, iso: IsoWeek, text: &str) -> EditResult<()> {
        let plan_id = self.active_plan_id();
        self.edit(|store| store.set_note(&plan_id, iso, text))
    }

    pub fn set_class_reps(&mut self, text: &str) -> EditResult<()> {
        self.set_class_reps_at(self.view.iso, text)
    }

    pub fn set_class_reps_at(&mut self, iso: IsoWeek, text: &str) -> EditResult<()> {
        let plan_id = self.active_plan_id();
        self.edit(|store| store.set_class_reps(&plan_id, iso, text))
    }

    pub fn set_qn_owner(&mut self, text: &str) -> EditResult<()> {
        self.set_qn_owner_at(self.view.iso, text)
    }

    pub fn set_qn_owner_at(&mut self, iso: IsoWeek, text: &str) -> EditResult<()> {
        let plan_id = self.active_plan_id();
        self.edit(|store| store.set_qn_owner(&plan_id, iso, text))
    }

    /// Snapshot of the displayed week without creating its record.
    pub fn week_view(&self) -> WeekView {
        self.week_view_at(self.view.iso, &self.legal)
    }

    /// Snapshot of any week of the active plan, with locks taken from `legal`.
    pub fn week_view_at(&self, iso: IsoWeek, legal: &LegalHolidayMap) -> WeekView {
        let doc = self.document();
        let plan = self.store.active_plan();
        let week = self
            .store
            .peek_week(self.store.active_plan_id(), iso)
            .cloned()
            .unwrap_or_default();
        let dates = iso.dates();
        WeekView {
            key: iso.key(),
            plan_id: self.store.active_plan_id().to_string(),
            plan_name: plan.map(|p| p.name.clone()).unwrap_or_default(),
            state: self.view.state,
            day_locks: legal.day_locks(&dates),
            dates,
            slot_labels: doc.settings.slot_labels.to_vec(),
            cells: week.cells,
            note: week.note,
            class_reps: week.class_reps,
            qn_owner: week.qn_owner,
        }
    }

    // Import / export

    /// Import JSON text. Text that is not JSON leaves the document untouched.
    pub fn import_json(&mut self, text: &str, mode: ImportMode) -> EditResult<()> {
        let value = migrate::parse_json(text)
            .ok_or_else(|| EditError::InvalidImport("not a JSON document".to_string()))?;
        let merged = migrate::import_value(self.document(), &value, mode);
        let state = merged.settings.state_code;
        self.store.replace_document(merged);
        if state != self.view.state {
            self.view.state = state;
            self.drop_legal_map();
        }
        self.dirty = true;
        info!(%mode, "imported document");
        Ok(())
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self.document())
    }

    pub fn into_document(self) -> Document {
        self.store.into_document()
    }
}
