use crate::model::StateCode;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// One successful fetch. Records without `fetchedAt` count as misses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord<T> {
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Persistent `"{state}-{year}"` → record map. Entries never expire; a later
/// successful fetch for the same key overwrites them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolidayCache<T> {
    records: BTreeMap<String, CacheRecord<T>>,
}

impl<T> Default for HolidayCache<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

pub fn cache_key(state: StateCode, year: i32) -> String {
    format!("{}-{year}", state.as_str())
}

impl<T> HolidayCache<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a persisted cache record by record; anything unreadable is skipped.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        let records = map
            .iter()
            .filter_map(|(key, raw)| {
                match serde_json::from_value::<CacheRecord<T>>(raw.clone()) {
                    Ok(record) => Some((key.clone(), record)),
                    Err(err) => {
                        debug!(key, error = %err, "dropping unreadable cache record");
                        None
                    }
                }
            })
            .collect();
        Self { records }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Cached items for `(state, year)`, if a completed fetch was recorded.
    pub fn get(&self, state: StateCode, year: i32) -> Option<&[T]> {
        self.records
            .get(&cache_key(state, year))
            .filter(|record| record.fetched_at.is_some())
            .map(|record| record.items.as_slice())
    }

    pub fn record(&self, key: &str) -> Option<&CacheRecord<T>> {
        self.records.get(key)
    }

    pub fn put(&mut self, state: StateCode, year: i32, items: Vec<T>) {
        self.records.insert(
            cache_key(state, year),
            CacheRecord {
                fetched_at: Some(Utc::now()),
                items,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
