use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type PlanId = String;
pub type WeekKey = String;

/// Schema version written by normalization (multi-plan layout).
pub const DOCUMENT_VERSION: u32 = 2;

pub const SLOTS_PER_DAY: u8 = 4;
pub const DAYS_PER_WEEK: u8 = 5;
pub const PAUSES_PER_DAY: usize = 3;

pub const DEFAULT_PLAN_NAME: &str = "Klasse";
pub const LEGACY_PLAN_NAME: &str = "AVöD I";
pub const DEFAULT_SUBJECT_COLOR: &str = "#6aa6ff";
pub const DEFAULT_SPECIAL_COLOR: &str = "#ffb86b";

/// Generate an opaque identifier such as `plan_3f2a…`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Federal states with holiday support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum StateCode {
    #[default]
    #[serde(rename = "BE")]
    Berlin,
    #[serde(rename = "BB")]
    Brandenburg,
}

impl StateCode {
    pub const ALL: [StateCode; 2] = [StateCode::Berlin, StateCode::Brandenburg];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateCode::Berlin => "BE",
            StateCode::Brandenburg => "BB",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StateCode::Berlin => "Berlin",
            StateCode::Brandenburg => "Brandenburg",
        }
    }

    /// ISO 3166-2 subdivision, e.g. `DE-BE`.
    pub fn subdivision(&self) -> &'static str {
        match self {
            StateCode::Berlin => "DE-BE",
            StateCode::Brandenburg => "DE-BB",
        }
    }

    /// Parse a current code or one of the aliases written by older builds.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "BE" | "BER" | "DE-BE" => Some(StateCode::Berlin),
            "BB" | "BRB" | "DE-BB" => Some(StateCode::Brandenburg),
            _ => None,
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateCode::from_code(s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccentKey {
    #[default]
    Blue,
    Green,
    Wine,
    Violet,
    Brown,
    Mustard,
}

impl AccentKey {
    pub const ALL: [AccentKey; 6] = [
        AccentKey::Blue,
        AccentKey::Green,
        AccentKey::Wine,
        AccentKey::Violet,
        AccentKey::Brown,
        AccentKey::Mustard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccentKey::Blue => "blue",
            AccentKey::Green => "green",
            AccentKey::Wine => "wine",
            AccentKey::Violet => "violet",
            AccentKey::Brown => "brown",
            AccentKey::Mustard => "mustard",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|accent| accent.as_str() == key)
    }

    /// `(dark, light)` hex colors of the preset.
    pub fn hex(&self) -> (&'static str, &'static str) {
        match self {
            AccentKey::Blue => ("#5c7da8", "#7fa2cc"),
            AccentKey::Green => ("#5b8f76", "#86b7a2"),
            AccentKey::Wine => ("#8a4a5b", "#c08b97"),
            AccentKey::Violet => ("#6f5a8e", "#a99bc4"),
            AccentKey::Brown => ("#7a6455", "#b7a69a"),
            AccentKey::Mustard => ("#8a7a42", "#c2b26a"),
        }
    }
}

pub fn default_slot_labels() -> [String; SLOTS_PER_DAY as usize] {
    std::array::from_fn(|idx| format!("Block {}", idx + 1))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub state_code: StateCode,
    pub slot_labels: [String; SLOTS_PER_DAY as usize],
    pub pause_labels: [String; PAUSES_PER_DAY],
    pub accent_key: AccentKey,
    pub active_plan_id: PlanId,
    #[serde(default)]
    pub holidays_collapsed: bool,
    #[serde(default)]
    pub holidays_pane_hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_code: StateCode::default(),
            slot_labels: default_slot_labels(),
            pause_labels: Default::default(),
            accent_key: AccentKey::default(),
            active_plan_id: String::new(),
            holidays_collapsed: false,
            holidays_pane_hidden: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub default_teacher_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Special {
    pub id: String,
    pub title: String,
    pub color: String,
}

/// Position of one cell: weekday 1..=5 (Monday..Friday) and block 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    day: u8,
    slot: u8,
}

impl CellKey {
    pub fn new(day: u8, slot: u8) -> Option<Self> {
        if (1..=DAYS_PER_WEEK).contains(&day) && slot < SLOTS_PER_DAY {
            Some(Self { day, slot })
        } else {
            None
        }
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn all() -> impl Iterator<Item = CellKey> {
        (1..=DAYS_PER_WEEK).flat_map(|day| (0..SLOTS_PER_DAY).map(move |slot| CellKey { day, slot }))
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.day, self.slot)
    }
}

impl FromStr for CellKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, slot) = s.split_once('-').ok_or(())?;
        let day = day.trim().parse::<u8>().map_err(|_| ())?;
        let slot = slot.trim().parse::<u8>().map_err(|_| ())?;
        CellKey::new(day, slot).ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCell {
    pub subject_id: String,
    #[serde(default)]
    pub teacher_id: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialCell {
    pub special_id: String,
    #[serde(default)]
    pub teacher_id: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub note: String,
}

/// Content of one timetable cell. `Empty` is never stored: writing it removes the key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CellEntry {
    #[default]
    Empty,
    Subject(SubjectCell),
    Special(SpecialCell),
}

impl CellEntry {
    pub fn subject(subject_id: impl Into<String>) -> Self {
        CellEntry::Subject(SubjectCell {
            subject_id: subject_id.into(),
            ..Default::default()
        })
    }

    pub fn special(special_id: impl Into<String>) -> Self {
        CellEntry::Special(SpecialCell {
            special_id: special_id.into(),
            ..Default::default()
        })
    }

    pub fn with_teacher(mut self, teacher: impl Into<String>) -> Self {
        match &mut self {
            CellEntry::Empty => {}
            CellEntry::Subject(cell) => cell.teacher_id = teacher.into(),
            CellEntry::Special(cell) => cell.teacher_id = teacher.into(),
        }
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        match &mut self {
            CellEntry::Empty => {}
            CellEntry::Subject(cell) => cell.room = room.into(),
            CellEntry::Special(cell) => cell.room = room.into(),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellEntry::Empty)
    }

    pub fn teacher_id(&self) -> Option<&str> {
        match self {
            CellEntry::Empty => None,
            CellEntry::Subject(cell) => Some(cell.teacher_id.as_str()),
            CellEntry::Special(cell) => Some(cell.teacher_id.as_str()),
        }
        .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    #[serde(default)]
    pub cells: BTreeMap<String, CellEntry>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub class_reps: String,
    #[serde(default)]
    pub qn_owner: String,
}

impl Week {
    pub fn is_blank(&self) -> bool {
        self.cells.is_empty()
            && self.note.trim().is_empty()
            && self.class_reps.trim().is_empty()
            && self.qn_owner.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub leader_id: String,
    #[serde(default)]
    pub weeks: BTreeMap<WeekKey, Week>,
}

impl Plan {
    pub fn new(id: impl Into<PlanId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            leader_id: String::new(),
            weeks: BTreeMap::new(),
        }
    }
}

/// The canonical persisted document. Only `migrate::normalize` builds one from raw input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settings: Settings,
    pub plans: BTreeMap<PlanId, Plan>,
    pub teachers: Vec<Teacher>,
    pub subjects: Vec<Subject>,
    pub specials: Vec<Special>,
    /// Legacy single-plan week storage; empty once migrated into `plans`.
    #[serde(default)]
    pub weeks: BTreeMap<WeekKey, Week>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        let now = Utc::now();
        let plan = Plan::new(new_id("plan"), DEFAULT_PLAN_NAME);
        let mut settings = Settings::default();
        settings.active_plan_id = plan.id.clone();
        Self {
            version: DOCUMENT_VERSION,
            created_at: now,
            updated_at: now,
            settings,
            plans: BTreeMap::from([(plan.id.clone(), plan)]),
            teachers: Vec::new(),
            subjects: Vec::new(),
            specials: Vec::new(),
            weeks: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

impl Document {
    pub fn teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn special(&self, id: &str) -> Option<&Special> {
        self.specials.iter().find(|s| s.id == id)
    }

    pub fn active_plan(&self) -> Option<&Plan> {
        self.plans.get(&self.settings.active_plan_id)
    }

    /// `"{label} ({teacher})"`, preferring the teacher's short name.
    pub fn entry_text(&self, entry: &CellEntry) -> String {
        let label = self.entry_label(entry);
        let teacher = entry
            .teacher_id()
            .and_then(|id| self.teacher(id))
            .map(|t| if t.short.is_empty() { t.name.as_str() } else { t.short.as_str() });
        match teacher {
            Some(teacher) if !label.is_empty() => format!("{label} ({teacher})"),
            _ => label,
        }
    }

    /// Short label of a cell for tabular output: subject name or special title.
    pub fn entry_label(&self, entry: &CellEntry) -> String {
        match entry {
            CellEntry::Empty => String::new(),
            CellEntry::Subject(cell) => self
                .subject(&cell.subject_id)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            CellEntry::Special(cell) => self
                .special(&cell.special_id)
                .map(|s| s.title.clone())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cell_key_round_trips_through_string() {
        let key = CellKey::new(2, 1).unwrap();
        assert_eq!(key.to_string(), "2-1");
        assert_eq!("2-1".parse::<CellKey>(), Ok(key));
        assert!("6-0".parse::<CellKey>().is_err());
        assert!("1-4".parse::<CellKey>().is_err());
        assert_eq!(CellKey::all().count(), 20);
    }

    #[test]
    fn cell_entry_uses_type_tag() {
        let entry = CellEntry::subject("s1").with_teacher("t1");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"type": "subject", "subjectId": "s1", "teacherId": "t1", "room": "", "note": ""})
        );
    }

    #[test]
    fn state_code_accepts_legacy_aliases() {
        assert_eq!(StateCode::from_code("ber"), Some(StateCode::Berlin));
        assert_eq!(StateCode::from_code("BRB"), Some(StateCode::Brandenburg));
        assert_eq!(StateCode::from_code("NW"), None);
    }
}
