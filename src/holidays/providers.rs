//! Remote holiday providers and the normalizers for their payloads.

use super::{HolidayError, HolidayInterval, HolidayResult, HolidaySource, PublicHoliday};
use crate::model::StateCode;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Europe::Berlin;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, instrument};

pub const OPENHOLIDAYS_URL: &str = "https://openholidaysapi.org";
pub const FERIEN_API_URL: &str = "https://ferien-api.de";
pub const FEIERTAGE_API_URL: &str = "https://feiertage-api.de";
pub const NAGER_URL: &str = "https://date.nager.at";

const FALLBACK_HOLIDAY_NAME: &str = "Ferien";
const FALLBACK_PUBLIC_HOLIDAY_NAME: &str = "Feiertag";

/// One source of holiday data for a `(state, year)` pair.
#[async_trait]
pub trait HolidayProvider: Send + Sync {
    type Item: Send;

    fn name(&self) -> &str;

    async fn fetch(&self, state: StateCode, year: i32) -> HolidayResult<Vec<Self::Item>>;
}

async fn get_json(request: reqwest::RequestBuilder, provider: &str) -> HolidayResult<Value> {
    let response = request.header(ACCEPT, "application/json").send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(HolidayError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.json::<Value>().await?)
}

fn shape(provider: &str, message: impl Into<String>) -> HolidayError {
    HolidayError::Shape {
        provider: provider.to_string(),
        message: message.into(),
    }
}

/// First ten characters of a date-like string as a calendar date.
fn date_prefix(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()
}

/// German calendar date of an RFC 3339 string or a millisecond timestamp.
/// ferien-api.de encodes local midnight as the previous day's 22:00/23:00 UTC.
fn local_date(value: &Value) -> Option<NaiveDate> {
    let instant: DateTime<Utc> = match value {
        Value::Number(millis) => DateTime::from_timestamp_millis(millis.as_i64()?)?,
        Value::String(text) => match DateTime::parse_from_rfc3339(text) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(_) => return date_prefix(value),
        },
        _ => return None,
    };
    Some(instant.with_timezone(&Berlin).date_naive())
}

fn localized_name(value: &Value) -> Option<String> {
    let text = |entry: &Value| {
        entry
            .get("text")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    match value {
        Value::String(name) if !name.trim().is_empty() => Some(name.clone()),
        Value::Array(entries) => entries
            .iter()
            .find(|entry| {
                ["languageIsoCode", "language"].iter().any(|key| {
                    entry
                        .get(*key)
                        .and_then(Value::as_str)
                        .is_some_and(|lang| lang.eq_ignore_ascii_case("DE"))
                })
            })
            .and_then(text)
            .or_else(|| entries.first().and_then(text)),
        Value::Object(_) => text(value),
        _ => None,
    }
}

/// Normalize an OpenHolidays `SchoolHolidays` response. An empty array is a
/// valid answer.
pub fn parse_openholidays(value: &Value, state: StateCode) -> HolidayResult<Vec<HolidayInterval>> {
    const PROVIDER: &str = "openholidays";
    let entries = value
        .as_array()
        .ok_or_else(|| shape(PROVIDER, "expected a JSON array"))?;
    let items = entries
        .iter()
        .filter_map(|entry| {
            let name = entry
                .get("name")
                .and_then(localized_name)
                .or_else(|| entry.get("title").and_then(localized_name))
                .unwrap_or_else(|| FALLBACK_HOLIDAY_NAME.to_string());
            let start_date = entry
                .get("startDate")
                .or_else(|| entry.get("validFrom"))
                .and_then(date_prefix)?;
            let end_date = entry
                .get("endDate")
                .or_else(|| entry.get("validTo"))
                .and_then(date_prefix)?;
            let slug = entry
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    generated_slug(state.subdivision(), start_date, end_date, &name)
                });
            Some(HolidayInterval {
                slug,
                name,
                start_date,
                end_date,
                source: HolidaySource::OpenHolidays,
            })
        })
        .collect();
    Ok(items)
}

fn generated_slug(prefix: &str, start: NaiveDate, end: NaiveDate, name: &str) -> String {
    format!("{prefix}-{start}-{end}-{name}")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Normalize a ferien-api.de response (UTC timestamps in `start`/`end`).
pub fn parse_ferien_api(value: &Value, state: StateCode) -> HolidayResult<Vec<HolidayInterval>> {
    const PROVIDER: &str = "ferien-api";
    let entries = value
        .as_array()
        .ok_or_else(|| shape(PROVIDER, "expected a JSON array"))?;
    let items = entries
        .iter()
        .filter_map(|entry| {
            let start_date = entry
                .get("start")
                .and_then(local_date)
                .or_else(|| entry.get("startDate").and_then(date_prefix))?;
            let end_date = entry
                .get("end")
                .and_then(local_date)
                .or_else(|| entry.get("endDate").and_then(date_prefix))?;
            let name = entry
                .get("name")
                .and_then(localized_name)
                .unwrap_or_else(|| FALLBACK_HOLIDAY_NAME.to_string());
            let slug = entry
                .get("slug")
                .and_then(Value::as_str)
                .filter(|slug| !slug.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| generated_slug(state.subdivision(), start_date, end_date, &name));
            Some(HolidayInterval {
                slug,
                name,
                start_date,
                end_date,
                source: HolidaySource::FerienApi,
            })
        })
        .collect();
    Ok(items)
}

/// Flatten a feiertage-api.de `{name: {datum}}` object.
pub fn parse_feiertage(value: &Value) -> HolidayResult<Vec<PublicHoliday>> {
    const PROVIDER: &str = "feiertage-api";
    let map = value
        .as_object()
        .ok_or_else(|| shape(PROVIDER, "expected a JSON object"))?;
    let items: Vec<PublicHoliday> = map
        .iter()
        .filter_map(|(name, info)| {
            let date = info.get("datum").and_then(date_prefix)?;
            Some(PublicHoliday {
                date,
                name: name.clone(),
            })
        })
        .collect();
    if items.is_empty() {
        return Err(HolidayError::Empty {
            provider: PROVIDER.to_string(),
        });
    }
    Ok(items)
}

/// Filter a nager.date country-wide list down to one subdivision.
pub fn parse_nager(value: &Value, state: StateCode) -> HolidayResult<Vec<PublicHoliday>> {
    const PROVIDER: &str = "nager";
    let entries = value
        .as_array()
        .ok_or_else(|| shape(PROVIDER, "expected a JSON array"))?;
    let subdivision = state.subdivision();
    let items = entries
        .iter()
        .filter(|entry| match entry.get("counties").and_then(Value::as_array) {
            Some(counties) => counties
                .iter()
                .any(|county| county.as_str() == Some(subdivision)),
            None => true,
        })
        .filter_map(|entry| {
            let date = entry.get("date").and_then(date_prefix)?;
            let name = ["localName", "name"]
                .iter()
                .filter_map(|key| entry.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|name| !name.is_empty())
                .unwrap_or(FALLBACK_PUBLIC_HOLIDAY_NAME)
                .to_string();
            Some(PublicHoliday { date, name })
        })
        .collect();
    Ok(items)
}

/// School holidays by ISO subdivision from openholidaysapi.org.
pub struct OpenHolidaysProvider {
    http: reqwest::Client,
    base_url: String,
}

impl OpenHolidaysProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url.into()),
        }
    }
}

impl Default for OpenHolidaysProvider {
    fn default() -> Self {
        Self::new(OPENHOLIDAYS_URL)
    }
}

#[async_trait]
impl HolidayProvider for OpenHolidaysProvider {
    type Item = HolidayInterval;

    fn name(&self) -> &str {
        "openholidays"
    }

    #[instrument(skip(self), fields(provider = "openholidays"))]
    async fn fetch(&self, state: StateCode, year: i32) -> HolidayResult<Vec<HolidayInterval>> {
        let valid_from = format!("{year}-01-01");
        let valid_to = format!("{year}-12-31");
        let request = self
            .http
            .get(format!("{}/SchoolHolidays", self.base_url))
            .query(&[
                ("countryIsoCode", "DE"),
                ("subdivisionCode", state.subdivision()),
                ("languageIsoCode", "DE"),
                ("validFrom", valid_from.as_str()),
                ("validTo", valid_to.as_str()),
            ]);
        let body = get_json(request, self.name()).await?;
        let items = parse_openholidays(&body, state)?;
        debug!(count = items.len(), "received school holidays");
        Ok(items)
    }
}

/// School holidays by state code and year from ferien-api.de.
pub struct FerienApiProvider {
    http: reqwest::Client,
    base_url: String,
}

impl FerienApiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url.into()),
        }
    }
}

impl Default for FerienApiProvider {
    fn default() -> Self {
        Self::new(FERIEN_API_URL)
    }
}

#[async_trait]
impl HolidayProvider for FerienApiProvider {
    type Item = HolidayInterval;

    fn name(&self) -> &str {
        "ferien-api"
    }

    #[instrument(skip(self), fields(provider = "ferien-api"))]
    async fn fetch(&self, state: StateCode, year: i32) -> HolidayResult<Vec<HolidayInterval>> {
        let request = self.http.get(format!(
            "{}/api/v1/holidays/{}/{year}",
            self.base_url,
            state.as_str()
        ));
        let body = get_json(request, self.name()).await?;
        parse_ferien_api(&body, state)
    }
}

/// Public holidays of one state from feiertage-api.de.
pub struct FeiertageApiProvider {
    http: reqwest::Client,
    base_url: String,
}

impl FeiertageApiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url.into()),
        }
    }
}

impl Default for FeiertageApiProvider {
    fn default() -> Self {
        Self::new(FEIERTAGE_API_URL)
    }
}

#[async_trait]
impl HolidayProvider for FeiertageApiProvider {
    type Item = PublicHoliday;

    fn name(&self) -> &str {
        "feiertage-api"
    }

    #[instrument(skip(self), fields(provider = "feiertage-api"))]
    async fn fetch(&self, state: StateCode, year: i32) -> HolidayResult<Vec<PublicHoliday>> {
        let year = year.to_string();
        let request = self
            .http
            .get(format!("{}/api/", self.base_url))
            .query(&[("jahr", year.as_str()), ("nur_land", state.as_str())]);
        let body = get_json(request, self.name()).await?;
        parse_feiertage(&body)
    }
}

/// Country-wide public holidays from date.nager.at, filtered by subdivision.
pub struct NagerProvider {
    http: reqwest::Client,
    base_url: String,
}

impl NagerProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url.into()),
        }
    }
}

impl Default for NagerProvider {
    fn default() -> Self {
        Self::new(NAGER_URL)
    }
}

#[async_trait]
impl HolidayProvider for NagerProvider {
    type Item = PublicHoliday;

    fn name(&self) -> &str {
        "nager"
    }

    #[instrument(skip(self), fields(provider = "nager"))]
    async fn fetch(&self, state: StateCode, year: i32) -> HolidayResult<Vec<PublicHoliday>> {
        let request = self
            .http
            .get(format!("{}/api/v3/PublicHolidays/{year}/DE", self.base_url));
        let body = get_json(request, self.name()).await?;
        parse_nager(&body, state)
    }
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn openholidays_prefers_german_name_and_builds_slug() {
        let body = json!([{
            "startDate": "2025-02-03",
            "endDate": "2025-02-08T00:00:00",
            "name": [
                {"language": "EN", "text": "Winter holidays"},
                {"language": "DE", "text": "Winterferien"}
            ]
        }]);
        let items = parse_openholidays(&body, StateCode::Berlin).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Winterferien");
        assert_eq!(items[0].end_date, d(2025, 2, 8));
        assert_eq!(items[0].slug, "de-be-2025-02-03-2025-02-08-winterferien");
    }

    #[test]
    fn openholidays_drops_entries_without_dates() {
        let body = json!([{"id": "a", "name": "x"}, {"id": "b", "validFrom": "2025-10-20", "validTo": "2025-11-01", "name": "Herbst"}]);
        let items = parse_openholidays(&body, StateCode::Berlin).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slug, "b");
    }

    #[test]
    fn ferien_api_timestamps_become_german_dates() {
        let body = json!([{
            "start": "2025-02-02T23:00Z",
            "end": "2025-02-08T23:00:00+01:00",
            "name": "winterferien",
            "slug": "winterferien-2025-BE"
        }, {
            "start": "2025-07-09T22:00:00Z",
            "end": 1_755_381_600_000i64,
            "name": "sommerferien",
            "slug": "sommerferien-2025-BE"
        }]);
        let items = parse_ferien_api(&body, StateCode::Berlin).unwrap();
        assert_eq!(items[0].start_date, d(2025, 2, 3));
        assert_eq!(items[0].end_date, d(2025, 2, 8));
        assert_eq!(items[1].start_date, d(2025, 7, 10));
        assert_eq!(items[1].end_date, d(2025, 8, 17));
    }

    #[test]
    fn feiertage_without_dates_is_empty() {
        let err = parse_feiertage(&json!({"Neujahr": {"hinweis": ""}})).unwrap_err();
        assert!(matches!(err, HolidayError::Empty { .. }));
    }

    #[test]
    fn nager_keeps_nationwide_and_matching_regional_entries() {
        let body = json!([
            {"date": "2025-01-01", "localName": "Neujahr", "counties": null},
            {"date": "2025-03-08", "localName": "Frauentag", "counties": ["DE-BE"]},
            {"date": "2025-01-06", "localName": "Heilige Drei Könige", "counties": ["DE-BW", "DE-BY"]},
            {"date": "2025-05-01", "localName": " ", "name": "Labour Day"}
        ]);
        let items = parse_nager(&body, StateCode::Berlin).unwrap();
        let names: Vec<_> = items.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["Neujahr", "Frauentag", "Labour Day"]);
    }
}
