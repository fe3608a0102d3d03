//! Normalization of arbitrary persisted or imported JSON into the canonical
//! [`Document`], plus the replace/merge import algorithms.
//!
//! Everything in here is total: malformed fragments are dropped or replaced by
//! defaults, never reported as errors.

use crate::calendar::parse_week_key;
use crate::model::{
    AccentKey, CellEntry, CellKey, DEFAULT_PLAN_NAME, DEFAULT_SPECIAL_COLOR, DEFAULT_SUBJECT_COLOR,
    DOCUMENT_VERSION, Document, LEGACY_PLAN_NAME, PAUSES_PER_DAY, Plan, PlanId, Settings,
    Special, SpecialCell, StateCode, Subject, SubjectCell, Teacher, Week, WeekKey, new_id,
};
use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

const DOCUMENT_KEYS: [&str; 9] = [
    "version",
    "createdAt",
    "updatedAt",
    "settings",
    "plans",
    "teachers",
    "subjects",
    "specials",
    "weeks",
];

const SETTINGS_KEYS: [&str; 7] = [
    "stateCode",
    "slotLabels",
    "pauseLabels",
    "accentKey",
    "activePlanId",
    "holidaysCollapsed",
    "holidaysPaneHidden",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Replace,
    Merge,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Replace => "replace",
            ImportMode::Merge => "merge",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(ImportMode::Replace),
            "merge" => Ok(ImportMode::Merge),
            other => Err(format!("unknown import mode '{other}'")),
        }
    }
}

/// Parse JSON text, returning `None` instead of an error for anything unparsable.
pub fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Normalize JSON text; unparsable text yields a fresh default document.
pub fn normalize_json(text: &str) -> Document {
    parse_json(text)
        .map(|value| normalize(&value))
        .unwrap_or_default()
}

/// Project any value onto the canonical document shape.
///
/// `normalize(normalize(x))` is structurally equal to `normalize(x)`.
pub fn normalize(raw: &Value) -> Document {
    let Some(obj) = raw.as_object() else {
        debug!("persisted data is not an object, starting from defaults");
        return Document::default();
    };

    let now = Utc::now();
    let created_at = timestamp(obj.get("createdAt")).unwrap_or(now);
    let updated_at = timestamp(obj.get("updatedAt")).unwrap_or(created_at);

    let mut settings = normalize_settings(obj.get("settings"));
    let teachers = unique_by_id(
        array(obj.get("teachers"))
            .filter_map(normalize_teacher)
            .collect(),
        |t: &Teacher| &t.id,
    );
    let subjects = unique_by_id(
        array(obj.get("subjects"))
            .filter_map(normalize_subject)
            .collect(),
        |s: &Subject| &s.id,
    );
    let specials = unique_by_id(
        array(obj.get("specials"))
            .filter_map(normalize_special)
            .collect(),
        |s: &Special| &s.id,
    );

    let mut weeks = normalize_weeks(obj.get("weeks"));
    let mut plans = normalize_plans(obj.get("plans"));

    if plans.is_empty() {
        let name = if weeks.is_empty() {
            DEFAULT_PLAN_NAME
        } else {
            LEGACY_PLAN_NAME
        };
        let mut plan = Plan::new(new_id("plan"), name);
        plan.weeks = std::mem::take(&mut weeks);
        info!(
            plan_id = %plan.id,
            weeks = plan.weeks.len(),
            "migrated single-plan storage into a plan"
        );
        settings.active_plan_id = plan.id.clone();
        plans.insert(plan.id.clone(), plan);
    }

    if !plans.contains_key(&settings.active_plan_id) {
        if let Some(first) = plans.keys().next() {
            settings.active_plan_id = first.clone();
        }
    }

    if !weeks.is_empty() {
        if let Some(active) = plans.get_mut(&settings.active_plan_id) {
            info!(
                plan_id = %active.id,
                weeks = weeks.len(),
                "folded leftover single-plan weeks into the active plan"
            );
            fold_weeks(&mut active.weeks, &weeks);
            weeks.clear();
        }
    }

    let extra = obj
        .iter()
        .filter(|(key, _)| !DOCUMENT_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Document {
        version: DOCUMENT_VERSION,
        created_at,
        updated_at,
        settings,
        plans,
        teachers,
        subjects,
        specials,
        weeks,
        extra,
    }
}

/// Only four-digit years are kept: anything else would not survive an
/// RFC 3339 round trip through the persisted document.
fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let parsed = match value? {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }?;
    (0..=9999).contains(&parsed.year()).then_some(parsed)
}

fn array(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

/// A non-empty string field.
fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A string field, empty when missing or not a string.
fn string(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn unique_by_id<T, F>(items: Vec<T>, id: F) -> Vec<T>
where
    F: Fn(&T) -> &String,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(id(item).clone()))
        .collect()
}

fn normalize_settings(raw: Option<&Value>) -> Settings {
    let mut settings = Settings::default();
    let Some(obj) = raw.and_then(Value::as_object) else {
        return settings;
    };

    if let Some(code) = obj.get("stateCode").and_then(Value::as_str) {
        settings.state_code = StateCode::from_code(code).unwrap_or_default();
    }
    if let Some(labels) = obj.get("slotLabels").and_then(Value::as_array) {
        for (slot, label) in settings.slot_labels.iter_mut().zip(labels) {
            if let Some(label) = label.as_str() {
                *slot = label.to_string();
            }
        }
    }
    if let Some(labels) = obj.get("pauseLabels").and_then(Value::as_array) {
        for (pause, label) in settings.pause_labels.iter_mut().zip(labels) {
            *pause = label.as_str().unwrap_or_default().to_string();
        }
    }
    settings.accent_key = obj
        .get("accentKey")
        .and_then(Value::as_str)
        .and_then(AccentKey::from_key)
        .unwrap_or_default();
    settings.active_plan_id = string(obj, "activePlanId");
    settings.holidays_collapsed = obj
        .get("holidaysCollapsed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    settings.holidays_pane_hidden = obj
        .get("holidaysPaneHidden")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    settings.extra = obj
        .iter()
        .filter(|(key, _)| !SETTINGS_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    debug_assert_eq!(settings.pause_labels.len(), PAUSES_PER_DAY);
    settings
}

fn normalize_teacher(value: &Value) -> Option<Teacher> {
    let obj = value.as_object()?;
    Some(Teacher {
        id: text(obj, "id")?,
        name: text(obj, "name")?,
        short: string(obj, "short"),
    })
}

fn normalize_subject(value: &Value) -> Option<Subject> {
    let obj = value.as_object()?;
    Some(Subject {
        id: text(obj, "id")?,
        name: text(obj, "name")?,
        color: text(obj, "color").unwrap_or_else(|| DEFAULT_SUBJECT_COLOR.to_string()),
        default_teacher_id: string(obj, "defaultTeacherId"),
    })
}

fn normalize_special(value: &Value) -> Option<Special> {
    let obj = value.as_object()?;
    Some(Special {
        id: text(obj, "id")?,
        title: text(obj, "title")?,
        color: text(obj, "color").unwrap_or_else(|| DEFAULT_SPECIAL_COLOR.to_string()),
    })
}

fn normalize_plans(raw: Option<&Value>) -> BTreeMap<PlanId, Plan> {
    let entries: Vec<(String, &Value)> = match raw {
        Some(Value::Object(map)) => map.iter().map(|(key, value)| (key.clone(), value)).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let key = value
                    .as_object()
                    .and_then(|obj| text(obj, "id"))
                    .unwrap_or_else(|| idx.to_string());
                (key, value)
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut plans = BTreeMap::new();
    for (key, value) in entries {
        let Some(obj) = value.as_object() else {
            debug!(plan = %key, "dropping malformed plan entry");
            continue;
        };
        let id = if key.is_empty() {
            text(obj, "id").unwrap_or_else(|| new_id("plan"))
        } else {
            key
        };
        let plan = Plan {
            id: id.clone(),
            name: text(obj, "name").unwrap_or_else(|| DEFAULT_PLAN_NAME.to_string()),
            leader_id: string(obj, "leaderId"),
            weeks: normalize_weeks(obj.get("weeks")),
        };
        plans.insert(id, plan);
    }
    plans
}

/// Weeks under canonical `YYYY-Www` keys. Keys that name no ISO week are
/// dropped; when two spellings name the same week the first one wins.
fn normalize_weeks(raw: Option<&Value>) -> BTreeMap<WeekKey, Week> {
    let mut weeks = BTreeMap::new();
    let Some(map) = raw.and_then(Value::as_object) else {
        return weeks;
    };
    for (key, value) in map {
        match parse_week_key(key) {
            Ok(iso) => {
                weeks.entry(iso.key()).or_insert_with(|| normalize_week(value));
            }
            Err(err) => debug!(week = %key, error = %err, "dropping week with malformed key"),
        }
    }
    weeks
}

fn normalize_week(value: &Value) -> Week {
    let Some(obj) = value.as_object() else {
        return Week::default();
    };
    let cells = obj
        .get("cells")
        .and_then(Value::as_object)
        .map(|cells| {
            cells
                .iter()
                .filter_map(|(key, value)| {
                    let key = key.parse::<CellKey>().ok()?;
                    normalize_cell(value).map(|entry| (key.to_string(), entry))
                })
                .collect()
        })
        .unwrap_or_default();
    Week {
        cells,
        note: string(obj, "note"),
        class_reps: string(obj, "classReps"),
        qn_owner: string(obj, "qnOwner"),
    }
}

/// Interpret one stored cell. Entries without a `type` tag are inferred from
/// the id field they carry.
fn normalize_cell(value: &Value) -> Option<CellEntry> {
    let obj = value.as_object()?;
    let subject_id = text(obj, "subjectId");
    let special_id = text(obj, "specialId");
    let subject = |subject_id: String| {
        CellEntry::Subject(SubjectCell {
            subject_id,
            teacher_id: string(obj, "teacherId"),
            room: string(obj, "room"),
            note: string(obj, "note"),
        })
    };
    let special = |special_id: String| {
        CellEntry::Special(SpecialCell {
            special_id,
            teacher_id: string(obj, "teacherId"),
            room: string(obj, "room"),
            note: string(obj, "note"),
        })
    };
    match obj.get("type").and_then(Value::as_str) {
        Some("subject") => subject_id.map(subject),
        Some("special") => special_id.map(special),
        None => subject_id.map(subject).or_else(|| special_id.map(special)),
        Some(_) => None,
    }
}

/// Apply an already normalized import to the current document.
pub fn apply_import(current: &Document, incoming: Document, mode: ImportMode) -> Document {
    match mode {
        ImportMode::Replace => incoming,
        ImportMode::Merge => merge_documents(current, &incoming),
    }
}

/// Normalize `raw` and apply it to `current`.
///
/// Merging input that carries no plans of its own (an entities-only file or a
/// single-plan export) folds its weeks into the current active plan instead of
/// adding the plan normalization had to synthesize for it.
pub fn import_value(current: &Document, raw: &Value, mode: ImportMode) -> Document {
    let incoming = normalize(raw);
    match mode {
        ImportMode::Replace => incoming,
        ImportMode::Merge if carries_plans(raw) => merge_documents(current, &incoming),
        ImportMode::Merge => merge_into_active(current, &incoming),
    }
}

fn carries_plans(raw: &Value) -> bool {
    !normalize_plans(raw.get("plans")).is_empty()
}

/// Merge `incoming` into a copy of `current` without overwriting anything the
/// current document already holds.
pub fn merge_documents(current: &Document, incoming: &Document) -> Document {
    let mut merged = merge_shared(current, incoming);
    for (plan_id, incoming_plan) in &incoming.plans {
        match merged.plans.get_mut(plan_id) {
            Some(target) => merge_plan(target, incoming_plan),
            None => {
                merged.plans.insert(plan_id.clone(), incoming_plan.clone());
            }
        }
    }
    info!(
        plans = merged.plans.len(),
        teachers = merged.teachers.len(),
        "merged imported document"
    );
    merged
}

fn merge_into_active(current: &Document, incoming: &Document) -> Document {
    let mut merged = merge_shared(current, incoming);
    let active_id = merged.settings.active_plan_id.clone();
    let weeks = incoming.plans.values().flat_map(|plan| &plan.weeks);
    if let Some(target) = merged.plans.get_mut(&active_id) {
        for (key, incoming_week) in weeks {
            fold_week(target.weeks.entry(key.clone()).or_default(), incoming_week);
        }
    }
    info!(
        plan_id = %active_id,
        teachers = merged.teachers.len(),
        "merged plan-less import into the active plan"
    );
    merged
}

/// Entities, settings and unknown fields; plans are left to the caller.
fn merge_shared(current: &Document, incoming: &Document) -> Document {
    let mut merged = current.clone();

    union_by_id(&mut merged.teachers, &incoming.teachers, |t| &t.id);
    union_by_id(&mut merged.subjects, &incoming.subjects, |s| &s.id);
    union_by_id(&mut merged.specials, &incoming.specials, |s| &s.id);

    merge_settings(&mut merged.settings, &incoming.settings);
    for (key, value) in &incoming.extra {
        merged
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    merged
}

fn union_by_id<T, F>(target: &mut Vec<T>, incoming: &[T], id: F)
where
    T: Clone,
    F: Fn(&T) -> &String,
{
    let mut ids: HashSet<String> = target.iter().map(|item| id(item).clone()).collect();
    for item in incoming {
        if ids.insert(id(item).clone()) {
            target.push(item.clone());
        }
    }
}

fn merge_plan(target: &mut Plan, incoming: &Plan) {
    if target.leader_id.trim().is_empty() {
        target.leader_id = incoming.leader_id.clone();
    }
    fold_weeks(&mut target.weeks, &incoming.weeks);
}

/// Add cells and blank text fields from `incoming` without overwriting.
fn fold_weeks(target: &mut BTreeMap<WeekKey, Week>, incoming: &BTreeMap<WeekKey, Week>) {
    for (key, incoming_week) in incoming {
        fold_week(target.entry(key.clone()).or_default(), incoming_week);
    }
}

fn fold_week(week: &mut Week, incoming: &Week) {
    for (cell_key, entry) in &incoming.cells {
        week.cells
            .entry(cell_key.clone())
            .or_insert_with(|| entry.clone());
    }
    fill_blank(&mut week.note, &incoming.note);
    fill_blank(&mut week.class_reps, &incoming.class_reps);
    fill_blank(&mut week.qn_owner, &incoming.qn_owner);
}

fn fill_blank(target: &mut String, incoming: &str) {
    let incoming = incoming.trim();
    if target.trim().is_empty() && !incoming.is_empty() {
        *target = incoming.to_string();
    }
}

fn merge_settings(target: &mut Settings, incoming: &Settings) {
    for (label, fallback) in target.slot_labels.iter_mut().zip(&incoming.slot_labels) {
        fill_blank(label, fallback);
    }
    for (label, fallback) in target.pause_labels.iter_mut().zip(&incoming.pause_labels) {
        fill_blank(label, fallback);
    }
    for (key, value) in &incoming.extra {
        target
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
