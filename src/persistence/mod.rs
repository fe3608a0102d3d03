use crate::config::{PlannerConfig, StorageBackend};
use crate::holidays::{HolidayCache, HolidayInterval, HolidayService, PublicHoliday};
use crate::migrate;
use crate::model::Document;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DOCUMENT_KEY: &str = "weekplan.document.v2";
pub const LEGACY_DOCUMENT_KEY: &str = "weekplan.document.v1";
pub const SCHOOL_CACHE_KEY: &str = "weekplan.school_holiday_cache.v1";
pub const LEGAL_CACHE_KEY: &str = "weekplan.legal_holiday_cache.v1";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("nothing stored under '{0}'")]
    NotFound(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Flat string key/value storage for the document and the holiday caches.
pub trait PlannerStore: Send + Sync {
    fn read(&self, key: &str) -> PersistenceResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> PersistenceResult<()>;
    fn remove(&self, key: &str) -> PersistenceResult<()>;
}

/// Open the backend selected in `config`, creating the data directory if needed.
pub fn open_store(config: &PlannerConfig) -> PersistenceResult<Box<dyn PlannerStore>> {
    std::fs::create_dir_all(&config.data_dir)?;
    match config.backend {
        StorageBackend::File => Ok(Box::new(DirectoryStore::new(&config.data_dir)?)),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => Ok(Box::new(SqliteStore::new(
            config.data_dir.join("weekplan.sqlite3"),
        )?)),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => Err(PersistenceError::InvalidData(
            "sqlite backend requires the `sqlite` feature".to_string(),
        )),
    }
}

fn read_json(store: &dyn PlannerStore, key: &str) -> Option<serde_json::Value> {
    match store.read(key) {
        Ok(Some(text)) => {
            let parsed = migrate::parse_json(&text);
            if parsed.is_none() {
                warn!(key, "stored value is not valid JSON");
            }
            parsed
        }
        Ok(None) => None,
        Err(err) => {
            warn!(key, error = %err, "failed to read stored value");
            None
        }
    }
}

/// Load and normalize the document. Never fails: the legacy key is consulted
/// when the current one is missing or unreadable, then defaults are used.
pub fn load_document(store: &dyn PlannerStore) -> Document {
    if let Some(value) = read_json(store, DOCUMENT_KEY) {
        return migrate::normalize(&value);
    }
    if let Some(value) = read_json(store, LEGACY_DOCUMENT_KEY) {
        info!("loading document from legacy storage key");
        return migrate::normalize(&value);
    }
    debug!("no stored document, starting fresh");
    Document::default()
}

/// Stamp `updatedAt` and persist.
pub fn save_document(store: &dyn PlannerStore, doc: &mut Document) -> PersistenceResult<()> {
    doc.updated_at = Utc::now();
    let json = serde_json::to_string(doc)?;
    store.write(DOCUMENT_KEY, &json)?;
    debug!(bytes = json.len(), "document saved");
    Ok(())
}

fn load_cache<T>(store: &dyn PlannerStore, key: &str) -> HolidayCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    read_json(store, key)
        .map(|value| HolidayCache::from_value(&value))
        .unwrap_or_default()
}

pub fn load_school_cache(store: &dyn PlannerStore) -> HolidayCache<HolidayInterval> {
    load_cache(store, SCHOOL_CACHE_KEY)
}

pub fn load_legal_cache(store: &dyn PlannerStore) -> HolidayCache<PublicHoliday> {
    load_cache(store, LEGAL_CACHE_KEY)
}

pub fn save_holiday_caches(
    store: &dyn PlannerStore,
    service: &HolidayService,
) -> PersistenceResult<()> {
    let school = serde_json::to_string(&service.school().cache_snapshot())?;
    store.write(SCHOOL_CACHE_KEY, &school)?;
    let legal = serde_json::to_string(&service.legal().cache_snapshot())?;
    store.write(LEGAL_CACHE_KEY, &legal)?;
    Ok(())
}

pub mod debounce;
pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use debounce::SaveDebouncer;
pub use file::{
    DirectoryStore, export_document_json, export_week_csv, import_document_json,
    write_week_csv,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
