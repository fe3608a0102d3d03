pub mod app;
pub mod calendar;
pub mod config;
pub mod holidays;
pub mod migrate;
pub mod model;
pub mod persistence;
pub mod store;

#[cfg(feature = "http_api")]
pub mod http_api;

pub use app::{Planner, ViewState, WeekView};
pub use calendar::{
    IsoWeek, WeekDates, clamp_week, iso_week_of, monday_of, parse_week_key, week_dates, week_key,
    weeks_in_iso_year,
};
pub use config::{PlannerConfig, ProviderConfig, StorageBackend};
pub use holidays::{
    HolidayError, HolidayInterval, HolidayOverview, HolidayService, HolidaySourceChain,
    LegalHolidayMap, PublicHoliday,
};
pub use migrate::{ImportMode, merge_documents, normalize};
pub use model::{
    CellEntry, CellKey, Document, Plan, Settings, Special, SpecialCell, StateCode, Subject,
    SubjectCell, Teacher, Week,
};
pub use persistence::{PersistenceError, PersistenceResult, PlannerStore};
pub use store::{EditError, EditResult, Placement, PlanStore};
