use super::{HolidayCache, HolidayError, HolidayProvider, HolidayResult};
use crate::model::StateCode;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Network-free source consulted before the cache.
pub type EmbeddedSource<T> = fn(StateCode, i32) -> Option<Vec<T>>;

/// Try each provider in order until one yields `Ok`.
pub async fn first_success<T: Send>(
    providers: &[Box<dyn HolidayProvider<Item = T>>],
    state: StateCode,
    year: i32,
) -> HolidayResult<Vec<T>> {
    if providers.is_empty() {
        return Err(HolidayError::NoProviders);
    }

    let mut last_error = None;
    for (index, provider) in providers.iter().enumerate() {
        match provider.fetch(state, year).await {
            Ok(items) => {
                if index > 0 {
                    info!(
                        "holiday fetch for {state}-{year} succeeded using fallback provider '{}' (attempt {})",
                        provider.name(),
                        index + 1
                    );
                }
                return Ok(items);
            }
            Err(err) => {
                warn!(
                    "holiday provider '{}' failed for {state}-{year} (attempt {}/{}): {}",
                    provider.name(),
                    index + 1,
                    providers.len(),
                    err
                );
                last_error = Some(err);
            }
        }
    }

    Err(HolidayError::Exhausted {
        attempts: providers.len(),
        last: Box::new(last_error.unwrap_or(HolidayError::NoProviders)),
    })
}

/// Embedded table, then cache, then remote providers in priority order.
/// Successful remote results are written to the cache.
pub struct HolidaySourceChain<T> {
    label: &'static str,
    embedded: Option<EmbeddedSource<T>>,
    cache: Mutex<HolidayCache<T>>,
    providers: Vec<Box<dyn HolidayProvider<Item = T>>>,
}

impl<T> HolidaySourceChain<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            embedded: None,
            cache: Mutex::new(HolidayCache::default()),
            providers: Vec::new(),
        }
    }

    pub fn with_embedded(mut self, source: EmbeddedSource<T>) -> Self {
        self.embedded = Some(source);
        self
    }

    pub fn with_cache(mut self, cache: HolidayCache<T>) -> Self {
        self.cache = Mutex::new(cache);
        self
    }

    /// Providers are tried in the order they are added.
    pub fn add_provider<P>(mut self, provider: P) -> Self
    where
        P: HolidayProvider<Item = T> + 'static,
    {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn label(&self) -> &str {
        self.label
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Copy of the cache for persisting.
    pub fn cache_snapshot(&self) -> HolidayCache<T> {
        self.cache.lock().clone()
    }

    fn embedded(&self, state: StateCode, year: i32) -> Option<Vec<T>> {
        self.embedded.and_then(|source| source(state, year))
    }

    pub async fn resolve(&self, state: StateCode, year: i32) -> HolidayResult<Vec<T>> {
        if let Some(items) = self.embedded(state, year) {
            debug!(chain = self.label, %state, year, "embedded holidays");
            return Ok(items);
        }
        let cached = self.cache.lock().get(state, year).map(<[T]>::to_vec);
        if let Some(items) = cached {
            debug!(chain = self.label, %state, year, "holiday cache hit");
            return Ok(items);
        }
        debug!(chain = self.label, %state, year, "holiday cache miss");
        self.fetch_and_store(state, year).await
    }

    /// Skip the cache read and overwrite the record on success. The embedded
    /// table still wins.
    pub async fn force_refresh(&self, state: StateCode, year: i32) -> HolidayResult<Vec<T>> {
        if let Some(items) = self.embedded(state, year) {
            return Ok(items);
        }
        self.fetch_and_store(state, year).await
    }

    /// Resolve several years concurrently; each writes its own cache key.
    pub async fn resolve_years(
        &self,
        state: StateCode,
        years: &[i32],
    ) -> Vec<(i32, HolidayResult<Vec<T>>)> {
        let results = join_all(years.iter().map(|&year| self.resolve(state, year))).await;
        years.iter().copied().zip(results).collect()
    }

    async fn fetch_and_store(&self, state: StateCode, year: i32) -> HolidayResult<Vec<T>> {
        let items = first_success(&self.providers, state, year).await?;
        self.cache.lock().put(state, year, items.clone());
        Ok(items)
    }
}
