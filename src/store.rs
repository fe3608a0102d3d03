use crate::calendar::IsoWeek;
use crate::model::{
    AccentKey, CellEntry, CellKey, DEFAULT_PLAN_NAME, DEFAULT_SPECIAL_COLOR,
    DEFAULT_SUBJECT_COLOR, Document, Plan, PlanId, SpecialCell, Special, StateCode, Subject,
    SubjectCell, Teacher, Week, new_id,
};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("{date} is a public holiday ({name}); editing is locked")]
    DayLocked { date: NaiveDate, name: String },
    #[error("no cell at day {day}, block {slot}")]
    InvalidCell { day: u8, slot: u8 },
    #[error("unknown plan '{0}'")]
    UnknownPlan(String),
    #[error("unknown {kind} '{id}'")]
    UnknownEntity { kind: &'static str, id: String },
    #[error("cell refers to unknown {kind} '{id}'")]
    UnknownReference { kind: &'static str, id: String },
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("import rejected: {0}")]
    InvalidImport(String),
}

pub type EditResult<T> = Result<T, EditError>;

/// Which reference entity is armed for click-to-place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Subject(String),
    Special(String),
}

/// Read a week, creating an empty record if it does not exist yet.
pub fn get_week(plan: &mut Plan, iso: IsoWeek) -> &mut Week {
    plan.weeks.entry(iso.key()).or_default()
}

pub fn get_entry(week: &Week, key: CellKey) -> CellEntry {
    week.cells
        .get(&key.to_string())
        .cloned()
        .unwrap_or_default()
}

/// Store `entry` verbatim; `Empty` removes the cell.
pub fn set_entry(week: &mut Week, key: CellKey, entry: CellEntry) {
    if entry.is_empty() {
        week.cells.remove(&key.to_string());
    } else {
        week.cells.insert(key.to_string(), entry);
    }
}

/// Write one independent copy of `entry` into each slot of `day`.
/// Nothing is written unless every slot is valid.
pub fn set_entries(week: &mut Week, day: u8, slots: &[u8], entry: &CellEntry) -> EditResult<()> {
    let keys = slots
        .iter()
        .map(|&slot| CellKey::new(day, slot).ok_or(EditError::InvalidCell { day, slot }))
        .collect::<EditResult<Vec<_>>>()?;
    for key in keys {
        set_entry(week, key, entry.clone());
    }
    Ok(())
}

/// The canonical document plus the transient placement selection.
#[derive(Debug, Clone)]
pub struct PlanStore {
    doc: Document,
    placement: Option<Placement>,
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl PlanStore {
    /// Wrap an already normalized document.
    pub fn new(doc: Document) -> Self {
        let mut store = Self {
            doc,
            placement: None,
        };
        store.ensure_active_plan();
        store
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Swap in a different document, dropping transient state.
    pub fn replace_document(&mut self, doc: Document) {
        self.doc = doc;
        self.placement = None;
        self.ensure_active_plan();
    }

    fn ensure_active_plan(&mut self) {
        if self.doc.plans.is_empty() {
            let plan = Plan::new(new_id("plan"), DEFAULT_PLAN_NAME);
            self.doc.plans.insert(plan.id.clone(), plan);
        }
        if !self.doc.plans.contains_key(&self.doc.settings.active_plan_id) {
            if let Some(first) = self.doc.plans.keys().next() {
                self.doc.settings.active_plan_id = first.clone();
            }
        }
    }

    pub fn active_plan_id(&self) -> &str {
        &self.doc.settings.active_plan_id
    }

    pub fn active_plan(&self) -> Option<&Plan> {
        self.doc.active_plan()
    }

    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.doc.plans.get(plan_id)
    }

    fn plan_mut(&mut self, plan_id: &str) -> EditResult<&mut Plan> {
        self.doc
            .plans
            .get_mut(plan_id)
            .ok_or_else(|| EditError::UnknownPlan(plan_id.to_string()))
    }

    /// Lazily creating week access.
    pub fn week_mut(&mut self, plan_id: &str, iso: IsoWeek) -> EditResult<&mut Week> {
        Ok(get_week(self.plan_mut(plan_id)?, iso))
    }

    /// Read-only week access; never creates a record.
    pub fn peek_week(&self, plan_id: &str, iso: IsoWeek) -> Option<&Week> {
        self.plan(plan_id)?.weeks.get(&iso.key())
    }

    pub fn entry(&self, plan_id: &str, iso: IsoWeek, key: CellKey) -> CellEntry {
        self.peek_week(plan_id, iso)
            .map(|week| get_entry(week, key))
            .unwrap_or_default()
    }

    pub fn set_entry(
        &mut self,
        plan_id: &str,
        iso: IsoWeek,
        key: CellKey,
        entry: CellEntry,
    ) -> EditResult<()> {
        self.check_entry_refs(&entry)?;
        set_entry(self.week_mut(plan_id, iso)?, key, entry);
        Ok(())
    }

    pub fn set_entries(
        &mut self,
        plan_id: &str,
        iso: IsoWeek,
        day: u8,
        slots: &[u8],
        entry: &CellEntry,
    ) -> EditResult<()> {
        self.check_entry_refs(entry)?;
        set_entries(self.week_mut(plan_id, iso)?, day, slots, entry)
    }

    /// Every id a cell carries must name an existing entity.
    fn check_entry_refs(&self, entry: &CellEntry) -> EditResult<()> {
        let dangling = |kind: &'static str, id: &str| EditError::UnknownReference {
            kind,
            id: id.to_string(),
        };
        let teacher_id = match entry {
            CellEntry::Empty => return Ok(()),
            CellEntry::Subject(cell) => {
                if self.doc.subject(&cell.subject_id).is_none() {
                    return Err(dangling("subject", &cell.subject_id));
                }
                &cell.teacher_id
            }
            CellEntry::Special(cell) => {
                if self.doc.special(&cell.special_id).is_none() {
                    return Err(dangling("special", &cell.special_id));
                }
                &cell.teacher_id
            }
        };
        if !teacher_id.is_empty() && self.doc.teacher(teacher_id).is_none() {
            return Err(dangling("teacher", teacher_id));
        }
        Ok(())
    }

    /// Drop the week record entirely. Returns whether one existed.
    pub fn clear_week(&mut self, plan_id: &str, iso: IsoWeek) -> EditResult<bool> {
        Ok(self.plan_mut(plan_id)?.weeks.remove(&iso.key()).is_some())
    }

    pub fn set_note(&mut self, plan_id: &str, iso: IsoWeek, text: &str) -> EditResult<()> {
        self.week_mut(plan_id, iso)?.note = text.to_string();
        Ok(())
    }

    pub fn set_class_reps(&mut self, plan_id: &str, iso: IsoWeek, text: &str) -> EditResult<()> {
        self.week_mut(plan_id, iso)?.class_reps = text.to_string();
        Ok(())
    }

    pub fn set_qn_owner(&mut self, plan_id: &str, iso: IsoWeek, text: &str) -> EditResult<()> {
        self.week_mut(plan_id, iso)?.qn_owner = text.to_string();
        Ok(())
    }

    // Plans

    /// Create a plan and make it active.
    pub fn add_plan(&mut self, name: &str) -> PlanId {
        let name = match name.trim() {
            "" => DEFAULT_PLAN_NAME,
            trimmed => trimmed,
        };
        let plan = Plan::new(new_id("plan"), name);
        let id = plan.id.clone();
        self.doc.plans.insert(id.clone(), plan);
        self.doc.settings.active_plan_id = id.clone();
        info!(plan_id = %id, name, "added plan");
        id
    }

    /// Create a plan with a leader in one step; nothing changes on error.
    pub fn create_plan(&mut self, name: &str, leader_id: &str) -> EditResult<PlanId> {
        self.check_teacher_ref(leader_id)?;
        let id = self.add_plan(name);
        self.plan_mut(&id)?.leader_id = leader_id.to_string();
        Ok(id)
    }

    /// Apply a rename, a leader change and activation together. Everything is
    /// validated first, so a rejected update leaves the plan untouched.
    pub fn update_plan(
        &mut self,
        plan_id: &str,
        name: Option<&str>,
        leader_id: Option<&str>,
        activate: bool,
    ) -> EditResult<()> {
        if !self.doc.plans.contains_key(plan_id) {
            return Err(EditError::UnknownPlan(plan_id.to_string()));
        }
        let name = name.map(|name| required(name, "plan name")).transpose()?;
        if let Some(leader_id) = leader_id {
            self.check_teacher_ref(leader_id)?;
        }
        let plan = self.plan_mut(plan_id)?;
        if let Some(name) = name {
            plan.name = name;
        }
        if let Some(leader_id) = leader_id {
            plan.leader_id = leader_id.to_string();
        }
        if activate {
            self.doc.settings.active_plan_id = plan_id.to_string();
        }
        Ok(())
    }

    pub fn rename_plan(&mut self, plan_id: &str, name: &str) -> EditResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EditError::MissingField("plan name"));
        }
        self.plan_mut(plan_id)?.name = name.to_string();
        Ok(())
    }

    /// Remove a plan. Removing the last one leaves a fresh empty plan behind.
    pub fn delete_plan(&mut self, plan_id: &str) -> EditResult<()> {
        if self.doc.plans.remove(plan_id).is_none() {
            return Err(EditError::UnknownPlan(plan_id.to_string()));
        }
        info!(plan_id, "deleted plan");
        self.ensure_active_plan();
        Ok(())
    }

    pub fn set_active_plan(&mut self, plan_id: &str) -> EditResult<()> {
        if !self.doc.plans.contains_key(plan_id) {
            return Err(EditError::UnknownPlan(plan_id.to_string()));
        }
        self.doc.settings.active_plan_id = plan_id.to_string();
        Ok(())
    }

    /// An empty `teacher_id` clears the leader.
    pub fn set_plan_leader(&mut self, plan_id: &str, teacher_id: &str) -> EditResult<()> {
        if !teacher_id.is_empty() && self.doc.teacher(teacher_id).is_none() {
            return Err(unknown("teacher", teacher_id));
        }
        self.plan_mut(plan_id)?.leader_id = teacher_id.to_string();
        Ok(())
    }

    // Teachers

    pub fn add_teacher(&mut self, name: &str, short: &str) -> EditResult<String> {
        let name = required(name, "teacher name")?;
        let teacher = Teacher {
            id: new_id("t"),
            name,
            short: short.trim().to_string(),
        };
        let id = teacher.id.clone();
        self.doc.teachers.push(teacher);
        Ok(id)
    }

    pub fn update_teacher(&mut self, id: &str, name: &str, short: &str) -> EditResult<()> {
        let name = required(name, "teacher name")?;
        let teacher = self
            .doc
            .teachers
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| unknown("teacher", id))?;
        teacher.name = name;
        teacher.short = short.trim().to_string();
        Ok(())
    }

    /// Remove a teacher and clear every reference to it. Cells keep their content.
    pub fn delete_teacher(&mut self, id: &str) -> EditResult<()> {
        let before = self.doc.teachers.len();
        self.doc.teachers.retain(|t| t.id != id);
        if self.doc.teachers.len() == before {
            return Err(unknown("teacher", id));
        }

        let mut cleared = 0usize;
        for plan in self.doc.plans.values_mut() {
            if plan.leader_id == id {
                plan.leader_id.clear();
            }
        }
        for week in all_weeks_mut(&mut self.doc) {
            for entry in week.cells.values_mut() {
                let teacher_id = match entry {
                    CellEntry::Subject(SubjectCell { teacher_id, .. })
                    | CellEntry::Special(SpecialCell { teacher_id, .. }) => teacher_id,
                    CellEntry::Empty => continue,
                };
                if *teacher_id == id {
                    teacher_id.clear();
                    cleared += 1;
                }
            }
        }
        for subject in &mut self.doc.subjects {
            if subject.default_teacher_id == id {
                subject.default_teacher_id.clear();
            }
        }
        info!(teacher_id = id, cleared, "deleted teacher");
        Ok(())
    }

    // Subjects

    pub fn add_subject(
        &mut self,
        name: &str,
        color: &str,
        default_teacher_id: &str,
    ) -> EditResult<String> {
        let name = required(name, "subject name")?;
        self.check_teacher_ref(default_teacher_id)?;
        let subject = Subject {
            id: new_id("s"),
            name,
            color: color_or(color, DEFAULT_SUBJECT_COLOR),
            default_teacher_id: default_teacher_id.to_string(),
        };
        let id = subject.id.clone();
        self.doc.subjects.push(subject);
        Ok(id)
    }

    pub fn update_subject(
        &mut self,
        id: &str,
        name: &str,
        color: &str,
        default_teacher_id: &str,
    ) -> EditResult<()> {
        let name = required(name, "subject name")?;
        self.check_teacher_ref(default_teacher_id)?;
        let subject = self
            .doc
            .subjects
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| unknown("subject", id))?;
        subject.name = name;
        subject.color = color_or(color, DEFAULT_SUBJECT_COLOR);
        subject.default_teacher_id = default_teacher_id.to_string();
        Ok(())
    }

    /// Remove a subject together with every cell that shows it.
    pub fn delete_subject(&mut self, id: &str) -> EditResult<()> {
        let before = self.doc.subjects.len();
        self.doc.subjects.retain(|s| s.id != id);
        if self.doc.subjects.len() == before {
            return Err(unknown("subject", id));
        }
        let removed = self.remove_cells(
            |entry| matches!(entry, CellEntry::Subject(cell) if cell.subject_id == id),
        );
        if self.placement == Some(Placement::Subject(id.to_string())) {
            self.placement = None;
        }
        info!(subject_id = id, removed, "deleted subject");
        Ok(())
    }

    // Specials

    pub fn add_special(&mut self, title: &str, color: &str) -> EditResult<String> {
        let title = required(title, "special title")?;
        let special = Special {
            id: new_id("sp"),
            title,
            color: color_or(color, DEFAULT_SPECIAL_COLOR),
        };
        let id = special.id.clone();
        self.doc.specials.push(special);
        Ok(id)
    }

    pub fn update_special(&mut self, id: &str, title: &str, color: &str) -> EditResult<()> {
        let title = required(title, "special title")?;
        let special = self
            .doc
            .specials
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| unknown("special", id))?;
        special.title = title;
        special.color = color_or(color, DEFAULT_SPECIAL_COLOR);
        Ok(())
    }

    pub fn delete_special(&mut self, id: &str) -> EditResult<()> {
        let before = self.doc.specials.len();
        self.doc.specials.retain(|s| s.id != id);
        if self.doc.specials.len() == before {
            return Err(unknown("special", id));
        }
        let removed = self.remove_cells(
            |entry| matches!(entry, CellEntry::Special(cell) if cell.special_id == id),
        );
        if self.placement == Some(Placement::Special(id.to_string())) {
            self.placement = None;
        }
        info!(special_id = id, removed, "deleted special");
        Ok(())
    }

    fn remove_cells<F>(&mut self, matches: F) -> usize
    where
        F: Fn(&CellEntry) -> bool,
    {
        let mut removed = 0;
        for week in all_weeks_mut(&mut self.doc) {
            let before = week.cells.len();
            week.cells.retain(|_, entry| !matches(entry));
            removed += before - week.cells.len();
        }
        removed
    }

    fn check_teacher_ref(&self, teacher_id: &str) -> EditResult<()> {
        if teacher_id.is_empty() || self.doc.teacher(teacher_id).is_some() {
            Ok(())
        } else {
            Err(unknown("teacher", teacher_id))
        }
    }

    // Placement

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /// Arm `placement`, or disarm it when it is already armed. Returns whether
    /// placement mode is active afterwards.
    pub fn toggle_placement(&mut self, placement: Placement) -> EditResult<bool> {
        match &placement {
            Placement::Subject(id) if self.doc.subject(id).is_none() => {
                return Err(unknown("subject", id));
            }
            Placement::Special(id) if self.doc.special(id).is_none() => {
                return Err(unknown("special", id));
            }
            _ => {}
        }
        if self.placement.as_ref() == Some(&placement) {
            self.placement = None;
            Ok(false)
        } else {
            debug!(?placement, "placement armed");
            self.placement = Some(placement);
            Ok(true)
        }
    }

    pub fn clear_placement(&mut self) {
        self.placement = None;
    }

    /// The entry the armed placement would write.
    pub fn placement_entry(&self) -> Option<CellEntry> {
        match self.placement.as_ref()? {
            Placement::Subject(id) => {
                let subject = self.doc.subject(id)?;
                Some(CellEntry::subject(id.clone()).with_teacher(subject.default_teacher_id.clone()))
            }
            Placement::Special(id) => {
                self.doc.special(id)?;
                Some(CellEntry::special(id.clone()))
            }
        }
    }

    /// Write the armed placement into a cell. Returns `false` when nothing is armed.
    pub fn apply_placement(
        &mut self,
        plan_id: &str,
        iso: IsoWeek,
        key: CellKey,
        keep: bool,
    ) -> EditResult<bool> {
        let Some(entry) = self.placement_entry() else {
            return Ok(false);
        };
        self.set_entry(plan_id, iso, key, entry)?;
        if !keep {
            self.placement = None;
        }
        Ok(true)
    }

    // Settings

    /// A blank label falls back to `Block N`.
    pub fn set_slot_label(&mut self, slot: usize, label: &str) -> EditResult<()> {
        let target = self
            .doc
            .settings
            .slot_labels
            .get_mut(slot)
            .ok_or(EditError::InvalidCell { day: 0, slot: slot as u8 })?;
        *target = match label.trim() {
            "" => format!("Block {}", slot + 1),
            trimmed => trimmed.to_string(),
        };
        Ok(())
    }

    pub fn set_pause_label(&mut self, pause: usize, label: &str) -> EditResult<()> {
        let target = self
            .doc
            .settings
            .pause_labels
            .get_mut(pause)
            .ok_or(EditError::InvalidCell { day: 0, slot: pause as u8 })?;
        *target = strip_pause_prefix(label);
        Ok(())
    }

    /// Unknown keys are ignored; returns whether the accent changed.
    pub fn set_accent(&mut self, key: &str) -> bool {
        match AccentKey::from_key(key.trim()) {
            Some(accent) => {
                self.doc.settings.accent_key = accent;
                true
            }
            None => false,
        }
    }

    pub fn set_state_code(&mut self, state: StateCode) {
        self.doc.settings.state_code = state;
    }

    pub fn set_holidays_collapsed(&mut self, collapsed: bool) {
        self.doc.settings.holidays_collapsed = collapsed;
    }

    pub fn set_holidays_pane_hidden(&mut self, hidden: bool) {
        self.doc.settings.holidays_pane_hidden = hidden;
    }
}

/// Weeks of every plan plus any legacy root weeks not yet migrated.
fn all_weeks_mut(doc: &mut Document) -> impl Iterator<Item = &mut Week> {
    doc.plans
        .values_mut()
        .flat_map(|plan| plan.weeks.values_mut())
        .chain(doc.weeks.values_mut())
}

fn unknown(kind: &'static str, id: &str) -> EditError {
    EditError::UnknownEntity {
        kind,
        id: id.to_string(),
    }
}

fn required(value: &str, field: &'static str) -> EditResult<String> {
    match value.trim() {
        "" => Err(EditError::MissingField(field)),
        trimmed => Ok(trimmed.to_string()),
    }
}

fn color_or(color: &str, fallback: &str) -> String {
    match color.trim() {
        "" => fallback.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// "Pause: Hof" and "pause - Hof" both become "Hof".
fn strip_pause_prefix(label: &str) -> String {
    let label = label.trim();
    let has_prefix = label
        .get(..5)
        .is_some_and(|head| head.eq_ignore_ascii_case("pause"));
    if !has_prefix {
        return label.to_string();
    }
    label[5..]
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_prefix_is_stripped_case_insensitively() {
        assert_eq!(strip_pause_prefix("Pause: Hof"), "Hof");
        assert_eq!(strip_pause_prefix("PAUSE – Mensa"), "Mensa");
        assert_eq!(strip_pause_prefix("Pausenhof"), "nhof");
        assert_eq!(strip_pause_prefix("Frühstück"), "Frühstück");
        assert_eq!(strip_pause_prefix("Päuse"), "Päuse");
    }

    #[test]
    fn set_entries_rejects_batches_with_invalid_slots() {
        let mut week = Week::default();
        let entry = CellEntry::subject("s1");
        let err = set_entries(&mut week, 2, &[0, 4], &entry).unwrap_err();
        assert_eq!(err, EditError::InvalidCell { day: 2, slot: 4 });
        assert!(week.cells.is_empty());
    }
}
