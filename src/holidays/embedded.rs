//! Hand-maintained Berlin school holidays, used before any cache or network source.

use super::{HolidayInterval, HolidaySource};
use crate::model::StateCode;
use chrono::NaiveDate;

type Entry = (&'static str, &'static str, &'static str);

const BERLIN: &[(i32, &[Entry])] = &[
    (
        2024,
        &[
            ("Herbstferien", "2024-10-21", "2024-11-02"),
            ("Weihnachtsferien", "2024-12-23", "2024-12-31"),
        ],
    ),
    (
        2025,
        &[
            ("Winterferien", "2025-02-03", "2025-02-08"),
            ("Osterferien", "2025-04-14", "2025-04-25"),
            ("Pfingstferien", "2025-06-10", "2025-06-10"),
            ("Sommerferien", "2025-07-24", "2025-09-06"),
            ("Herbstferien", "2025-10-20", "2025-11-01"),
            ("Weihnachtsferien", "2025-12-22", "2026-01-02"),
        ],
    ),
    (
        2026,
        &[
            ("Winterferien", "2026-02-02", "2026-02-07"),
            ("Osterferien", "2026-03-30", "2026-04-10"),
            ("Pfingstferien", "2026-05-26", "2026-05-26"),
            ("Sommerferien", "2026-07-09", "2026-08-22"),
            ("Herbstferien", "2026-10-19", "2026-10-31"),
            ("Weihnachtsferien", "2026-12-23", "2027-01-02"),
        ],
    ),
    (
        2027,
        &[
            ("Winterferien", "2027-02-01", "2027-02-06"),
            ("Osterferien", "2027-03-22", "2027-04-02"),
            ("Pfingstferien", "2027-05-18", "2027-05-18"),
            ("Sommerferien", "2027-07-01", "2027-08-14"),
            ("Herbstferien", "2027-10-11", "2027-10-23"),
            ("Weihnachtsferien", "2027-12-22", "2027-12-31"),
        ],
    ),
    (
        2028,
        &[
            ("Winterferien", "2028-01-31", "2028-02-05"),
            ("Osterferien", "2028-04-10", "2028-04-22"),
            ("Pfingstferien", "2028-06-01", "2028-06-02"),
            ("Sommerferien", "2028-07-01", "2028-08-12"),
            ("Herbstferien", "2028-10-02", "2028-10-14"),
            ("Weihnachtsferien", "2028-12-22", "2029-01-02"),
        ],
    ),
    (
        2029,
        &[
            ("Winterferien", "2029-01-29", "2029-02-03"),
            ("Osterferien", "2029-03-26", "2029-04-06"),
            ("Pfingstferien", "2029-05-22", "2029-05-22"),
            ("Sommerferien", "2029-07-01", "2029-08-11"),
            ("Herbstferien", "2029-10-01", "2029-10-12"),
            ("Weihnachtsferien", "2029-12-21", "2030-01-04"),
        ],
    ),
    (
        2030,
        &[
            ("Winterferien", "2030-02-04", "2030-02-09"),
            ("Osterferien", "2030-04-15", "2030-04-26"),
            ("Pfingstferien", "2030-06-07", "2030-06-07"),
            ("Sommerferien", "2030-07-04", "2030-08-17"),
        ],
    ),
];

/// Embedded intervals for `(state, year)`, or `None` when the table does not cover it.
pub fn school_holidays(state: StateCode, year: i32) -> Option<Vec<HolidayInterval>> {
    if state != StateCode::Berlin {
        return None;
    }
    let (_, entries) = BERLIN.iter().find(|(y, _)| *y == year)?;
    let items: Vec<HolidayInterval> = entries
        .iter()
        .filter_map(|&(name, start, end)| {
            let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
            let end_date = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
            Some(HolidayInterval {
                slug: format!("de-be-{start}-{end}-{}", name.to_lowercase()),
                name: name.to_string(),
                start_date,
                end_date,
                source: HolidaySource::Embedded,
            })
        })
        .collect();
    (!items.is_empty()).then_some(items)
}

pub fn covered_years() -> impl Iterator<Item = i32> {
    BERLIN.iter().map(|(year, _)| *year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_embedded_entry_parses() {
        for year in covered_years() {
            let expected = BERLIN
                .iter()
                .find(|(y, _)| *y == year)
                .map(|(_, e)| e.len())
                .unwrap();
            let items = school_holidays(StateCode::Berlin, year).unwrap();
            assert_eq!(items.len(), expected, "year {year}");
            assert!(items.iter().all(|h| h.start_date <= h.end_date));
        }
    }

    #[test]
    fn only_berlin_is_embedded() {
        assert!(school_holidays(StateCode::Brandenburg, 2025).is_none());
        assert!(school_holidays(StateCode::Berlin, 2023).is_none());
    }
}
