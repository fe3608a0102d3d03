use super::{HolidayInterval, PublicHoliday};
use crate::calendar::{SCHOOL_DAYS, WeekDates};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of intervals listed after the displayed week.
pub const UPCOMING_LIMIT: usize = 4;

/// Inclusive on both ends and symmetric.
pub fn ranges_overlap(
    a_start: NaiveDate,
    a_end: NaiveDate,
    b_start: NaiveDate,
    b_end: NaiveDate,
) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// Flatten per-year batches, keeping the first interval seen for each slug,
/// ordered by start date.
pub fn merge_intervals<I>(batches: I) -> Vec<HolidayInterval>
where
    I: IntoIterator<Item = Vec<HolidayInterval>>,
{
    let mut seen = HashSet::new();
    let mut merged: Vec<HolidayInterval> = batches
        .into_iter()
        .flatten()
        .filter(|interval| seen.insert(interval.slug.clone()))
        .collect();
    merged.sort_by_key(|interval| interval.start_date);
    merged
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayOverview {
    /// Intervals touching the displayed Monday..Friday.
    pub overlapping: Vec<HolidayInterval>,
    /// The next intervals starting after Friday.
    pub upcoming: Vec<HolidayInterval>,
}

impl HolidayOverview {
    /// `merged` must be sorted by start date.
    pub fn for_week(merged: &[HolidayInterval], dates: &WeekDates) -> Self {
        let overlapping = merged
            .iter()
            .filter(|h| ranges_overlap(h.start_date, h.end_date, dates.start, dates.end))
            .cloned()
            .collect();
        let upcoming = merged
            .iter()
            .filter(|h| h.start_date > dates.end)
            .take(UPCOMING_LIMIT)
            .cloned()
            .collect();
        Self {
            overlapping,
            upcoming,
        }
    }
}

/// Public holidays keyed by exact date. A day in this map is locked for editing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegalHolidayMap {
    days: BTreeMap<NaiveDate, String>,
}

impl LegalHolidayMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first name recorded for a date wins.
    pub fn insert(&mut self, holiday: PublicHoliday) {
        self.days.entry(holiday.date).or_insert(holiday.name);
    }

    pub fn name_for(&self, date: NaiveDate) -> Option<&str> {
        self.days.get(&date).map(String::as_str)
    }

    pub fn is_locked(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    /// Lock reason for each of the five school days.
    pub fn day_locks(&self, dates: &WeekDates) -> [Option<String>; SCHOOL_DAYS] {
        dates.days.map(|day| self.name_for(day).map(str::to_string))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &String)> {
        self.days.iter()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl Extend<PublicHoliday> for LegalHolidayMap {
    fn extend<I: IntoIterator<Item = PublicHoliday>>(&mut self, iter: I) {
        for holiday in iter {
            self.insert(holiday);
        }
    }
}

impl FromIterator<PublicHoliday> for LegalHolidayMap {
    fn from_iter<I: IntoIterator<Item = PublicHoliday>>(iter: I) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}
