use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Monday to Friday.
pub const SCHOOL_DAYS: usize = 5;

/// An ISO-8601 week coordinate. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

/// The five school days of one ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekDates {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: [NaiveDate; SCHOOL_DAYS],
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeekKeyError {
    #[error("week key '{0}' is not of the form YYYY-Www")]
    Malformed(String),
    #[error("week {week} does not exist in ISO year {year}")]
    OutOfRange { year: i32, week: u32 },
}

fn iso_weekday(date: NaiveDate) -> i64 {
    // Sunday counts as 7
    i64::from(date.weekday().number_from_monday())
}

/// Add a signed number of days, saturating at the representable date range.
fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

fn date_ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    let year = year.clamp(NaiveDate::MIN.year() + 1, NaiveDate::MAX.year() - 1);
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// ISO year and week of `date`: the Thursday of the date's week decides the year.
pub fn iso_week_of(date: NaiveDate) -> IsoWeek {
    let thursday = shift_days(date, 4 - iso_weekday(date));
    IsoWeek {
        year: thursday.year(),
        week: thursday.ordinal0() / 7 + 1,
    }
}

/// 52 or 53. December 28 always falls into the last ISO week of its year.
pub fn weeks_in_iso_year(iso_year: i32) -> u32 {
    iso_week_of(date_ymd(iso_year, 12, 28)).week
}

/// Monday of the given ISO week. Total for any input; callers clamp `iso_week`
/// before displaying the result.
pub fn monday_of(iso_year: i32, iso_week: i32) -> NaiveDate {
    let jan4 = date_ymd(iso_year, 1, 4);
    let offset = -(iso_weekday(jan4) - 1) + (i64::from(iso_week) - 1) * 7;
    shift_days(jan4, offset)
}

pub fn week_dates(iso_year: i32, iso_week: i32) -> WeekDates {
    let start = monday_of(iso_year, iso_week);
    let mut days = [start; SCHOOL_DAYS];
    for (offset, day) in days.iter_mut().enumerate() {
        *day = shift_days(start, offset as i64);
    }
    WeekDates {
        start,
        end: days[SCHOOL_DAYS - 1],
        days,
    }
}

/// Clamp a week number into `[1, weeks_in_iso_year(iso_year)]`.
pub fn clamp_week(iso_year: i32, iso_week: i64) -> u32 {
    let max = weeks_in_iso_year(iso_year);
    iso_week.clamp(1, i64::from(max)) as u32
}

pub fn week_key(iso_year: i32, iso_week: u32) -> String {
    format!("{iso_year}-W{iso_week:02}")
}

pub fn parse_week_key(key: &str) -> Result<IsoWeek, WeekKeyError> {
    let malformed = || WeekKeyError::Malformed(key.to_string());
    let (year, week) = key.rsplit_once("-W").ok_or_else(malformed)?;
    if week.len() != 2 || !week.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let year: i32 = year.parse().map_err(|_| malformed())?;
    let week: u32 = week.parse().map_err(|_| malformed())?;
    if week == 0 || week > weeks_in_iso_year(year) {
        return Err(WeekKeyError::OutOfRange { year, week });
    }
    Ok(IsoWeek { year, week })
}

impl IsoWeek {
    /// Build a week, clamping the week number into the year's valid range.
    pub fn new(year: i32, week: i64) -> Self {
        Self {
            year,
            week: clamp_week(year, week),
        }
    }

    pub fn containing(date: NaiveDate) -> Self {
        iso_week_of(date)
    }

    pub fn key(&self) -> String {
        week_key(self.year, self.week)
    }

    pub fn monday(&self) -> NaiveDate {
        monday_of(self.year, self.week as i32)
    }

    pub fn dates(&self) -> WeekDates {
        week_dates(self.year, self.week as i32)
    }

    /// Move by `delta` weeks, crossing year boundaries as needed.
    pub fn shifted(&self, delta: i64) -> Self {
        iso_week_of(shift_days(self.monday(), delta.saturating_mul(7)))
    }
}

impl fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for IsoWeek {
    type Err = WeekKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_week_key(s)
    }
}

impl WeekDates {
    /// Distinct calendar years touched by the five days, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.days.iter().map(|d| d.year()).collect();
        years.dedup();
        years
    }

    /// Weekday index (1 = Monday .. 5 = Friday) of `date`, if it is one of the days.
    pub fn day_index(&self, date: NaiveDate) -> Option<u8> {
        self.days
            .iter()
            .position(|d| *d == date)
            .map(|idx| idx as u8 + 1)
    }
}
