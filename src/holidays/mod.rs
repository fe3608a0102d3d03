//! School and public holiday resolution.
//!
//! School holidays are advisory ranges; public holidays lock editing on their day.

pub mod cache;
pub mod chain;
pub mod embedded;
pub mod merge;
pub mod providers;

pub use cache::{CacheRecord, HolidayCache};
pub use chain::{HolidaySourceChain, first_success};
pub use merge::{HolidayOverview, LegalHolidayMap, merge_intervals, ranges_overlap};
pub use providers::{
    FeiertageApiProvider, FerienApiProvider, HolidayProvider, NagerProvider,
    OpenHolidaysProvider,
};

use crate::calendar::{IsoWeek, WeekDates};
use crate::config::{PlannerConfig, ProviderConfig};
use crate::model::StateCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HolidaySource {
    Embedded,
    #[serde(rename = "openholidays")]
    OpenHolidays,
    FerienApi,
    #[serde(other)]
    Unknown,
}

/// An inclusive range of school holidays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayInterval {
    #[serde(alias = "id")]
    pub slug: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: HolidaySource,
}

impl HolidayInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn display_name(&self) -> String {
        pretty_name(&self.name)
    }
}

/// A single public holiday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicHoliday {
    pub date: NaiveDate,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum HolidayError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} answered with status {status}")]
    Status { provider: String, status: u16 },
    #[error("{provider} returned an unexpected payload: {message}")]
    Shape { provider: String, message: String },
    #[error("{provider} returned no holidays")]
    Empty { provider: String },
    #[error("no holiday providers configured")]
    NoProviders,
    #[error("all {attempts} holiday providers failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<HolidayError>,
    },
}

pub type HolidayResult<T> = Result<T, HolidayError>;

/// Display name for raw provider names such as `winterferien`.
pub fn pretty_name(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    let mapped = match key.as_str() {
        "winterferien" => Some("Winterferien"),
        "osterferien" => Some("Osterferien"),
        "pfingstferien" => Some("Pfingstferien"),
        "sommerferien" => Some("Sommerferien"),
        "herbstferien" => Some("Herbstferien"),
        "weihnachtsferien" => Some("Weihnachtsferien"),
        "fruehjahrsferien" | "frühjahrsferien" => Some("Frühjahrsferien"),
        _ => None,
    };
    if let Some(name) = mapped {
        return name.to_string();
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Both holiday chains, wired the way the planner uses them.
pub struct HolidayService {
    school: HolidaySourceChain<HolidayInterval>,
    legal: HolidaySourceChain<PublicHoliday>,
}

impl HolidayService {
    pub fn new(
        school: HolidaySourceChain<HolidayInterval>,
        legal: HolidaySourceChain<PublicHoliday>,
    ) -> Self {
        Self { school, legal }
    }

    /// Embedded table, cache, then the remote providers configured in `providers`.
    pub fn from_config(
        providers: &ProviderConfig,
        school_cache: HolidayCache<HolidayInterval>,
        legal_cache: HolidayCache<PublicHoliday>,
    ) -> Self {
        let client = reqwest::Client::new();
        let school = HolidaySourceChain::new("school")
            .with_embedded(embedded::school_holidays)
            .with_cache(school_cache)
            .add_provider(OpenHolidaysProvider::with_client(
                client.clone(),
                &providers.openholidays_url,
            ))
            .add_provider(FerienApiProvider::with_client(
                client.clone(),
                &providers.ferien_api_url,
            ));
        let legal = HolidaySourceChain::new("legal")
            .with_cache(legal_cache)
            .add_provider(FeiertageApiProvider::with_client(
                client.clone(),
                &providers.feiertage_api_url,
            ))
            .add_provider(NagerProvider::with_client(client, &providers.nager_url));
        Self::new(school, legal)
    }

    /// Honors `config.offline`.
    pub fn for_config(
        config: &PlannerConfig,
        school_cache: HolidayCache<HolidayInterval>,
        legal_cache: HolidayCache<PublicHoliday>,
    ) -> Self {
        if config.offline {
            Self::offline(school_cache, legal_cache)
        } else {
            Self::from_config(&config.providers, school_cache, legal_cache)
        }
    }

    /// No remote providers: embedded table and caches only.
    pub fn offline(
        school_cache: HolidayCache<HolidayInterval>,
        legal_cache: HolidayCache<PublicHoliday>,
    ) -> Self {
        Self::new(
            HolidaySourceChain::new("school")
                .with_embedded(embedded::school_holidays)
                .with_cache(school_cache),
            HolidaySourceChain::new("legal").with_cache(legal_cache),
        )
    }

    pub fn school(&self) -> &HolidaySourceChain<HolidayInterval> {
        &self.school
    }

    pub fn legal(&self) -> &HolidaySourceChain<PublicHoliday> {
        &self.legal
    }

    /// School holidays around the displayed week. Fetches the neighbouring
    /// years too so ranges crossing New Year are found. Fails only when no
    /// year could be resolved at all.
    pub async fn school_overview(
        &self,
        state: StateCode,
        iso: IsoWeek,
    ) -> HolidayResult<HolidayOverview> {
        let years = [iso.year - 1, iso.year, iso.year + 1];
        let results = self.school.resolve_years(state, &years).await;

        let mut batches = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (year, result) in results {
            match result {
                Ok(items) => batches.push(items),
                Err(err) => {
                    debug!(state = %state, year, error = %err, "school holidays unavailable");
                    last_error = Some(err);
                }
            }
        }
        if batches.is_empty() {
            return Err(last_error.unwrap_or(HolidayError::NoProviders));
        }
        let merged = merge_intervals(batches);
        Ok(HolidayOverview::for_week(&merged, &iso.dates()))
    }

    /// Public holidays for every year in `years`. Years that cannot be
    /// resolved contribute nothing.
    pub async fn legal_map(&self, state: StateCode, years: &[i32]) -> LegalHolidayMap {
        let mut map = LegalHolidayMap::default();
        for (year, result) in self.legal.resolve_years(state, years).await {
            match result {
                Ok(items) => map.extend(items),
                Err(err) => warn!(state = %state, year, error = %err, "public holidays unavailable"),
            }
        }
        map
    }

    /// Convenience for the displayed week's years.
    pub async fn legal_map_for_week(&self, state: StateCode, dates: &WeekDates) -> LegalHolidayMap {
        self.legal_map(state, &dates.years()).await
    }
}
