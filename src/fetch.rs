//! Cached Fetch Module
//!
//! Memoizes async computations in a [`CacheBackend`] and exposes key and
//! tag invalidation.
//!
//! [`CacheService`] is the explicit handle callers share; it is cheap to
//! clone. [`CacheService::cached`] wraps an async function into a
//! [`CachedFn`] whose results are reused for the preset's revalidation window.
//!
//! Concurrent misses for the same key both compute unless single-flight is
//! enabled, in which case later callers wait for the first and then read its
//! result from the cache.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::cache::{shared, CacheBackend, Clock, TagStore};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::keys::{get_cache_key, params_from, ParamValue};
use crate::presets::CachePreset;

// == Cache Service ==
/// Shared handle to a cache backend.
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    coalescer: Option<Arc<KeyCoalescer>>,
}

impl CacheService {
    /// Creates a service over `backend` with single-flight disabled.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            coalescer: None,
        }
    }

    /// Creates a service over a fresh in-memory store sized from `config`.
    pub fn in_memory(config: &Config) -> Self {
        Self::new(shared(TagStore::new(config.max_entries)))
            .with_single_flight(config.single_flight)
    }

    /// Like [`CacheService::in_memory`] but with an injected clock.
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(shared(TagStore::with_clock(config.max_entries, clock)))
            .with_single_flight(config.single_flight)
    }

    /// Enables or disables per-key coalescing of concurrent misses.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.coalescer = enabled.then(|| Arc::new(KeyCoalescer::new()));
        self
    }

    pub fn single_flight(&self) -> bool {
        self.coalescer.is_some()
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    // == Cached ==
    /// Wraps `f` so its results are memoized under `name` with `preset`.
    pub fn cached<F>(&self, name: impl Into<String>, preset: CachePreset, f: F) -> CachedFn<F> {
        CachedFn {
            name: name.into(),
            preset,
            static_tags: Vec::new(),
            service: self.clone(),
            f,
        }
    }

    // == Invalidation ==
    /// Expires the named keys. Empty input and unknown keys are no-ops.
    pub async fn invalidate_by_key<S: AsRef<str>>(&self, keys: &[S]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = to_owned_strings(keys);
        let removed = self.backend.invalidate_keys(&keys).await?;
        debug!("Invalidated {} entries by key {:?}", removed, keys);
        Ok(())
    }

    /// Expires every entry carrying one of `tags`. Empty input and unknown
    /// tags are no-ops.
    pub async fn invalidate_by_tag<S: AsRef<str>>(&self, tags: &[S]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let tags = to_owned_strings(tags);
        let removed = self.backend.invalidate_tags(&tags).await?;
        debug!("Invalidated {} entries by tag {:?}", removed, tags);
        Ok(())
    }

    /// Expires whatever `preset` would have tagged for a call with `params`.
    pub async fn revalidate_preset(
        &self,
        preset: CachePreset,
        params: Option<&ParamValue>,
    ) -> Result<()> {
        self.invalidate_by_tag(&preset.tags(params)).await
    }
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("single_flight", &self.single_flight())
            .finish_non_exhaustive()
    }
}

fn to_owned_strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items
        .iter()
        .map(|item| AsRef::<str>::as_ref(item).to_string())
        .collect()
}

// == Cached Function ==
/// An async function whose results are memoized per derived key.
pub struct CachedFn<F> {
    name: String,
    preset: CachePreset,
    static_tags: Vec<String>,
    service: CacheService,
    f: F,
}

impl<F> CachedFn<F> {
    /// Adds tags attached to every entry this function produces.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.static_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preset(&self) -> CachePreset {
        self.preset
    }

    /// The cache key a call with `args` reads and writes.
    pub fn key_for<A: Serialize>(&self, args: &A) -> Result<String> {
        let params = params_from(args)?;
        Ok(get_cache_key(&self.name, params.as_ref()))
    }

    /// The tags an entry produced by a call with `args` carries.
    pub fn tags_for<A: Serialize>(&self, args: &A) -> Result<Vec<String>> {
        let params = params_from(args)?;
        Ok(self.merged_tags(params.as_ref()))
    }

    fn merged_tags(&self, params: Option<&ParamValue>) -> Vec<String> {
        let merged: BTreeSet<String> = self
            .static_tags
            .iter()
            .cloned()
            .chain(self.preset.tags(params))
            .collect();
        merged.into_iter().collect()
    }

    // == Call ==
    /// Returns the cached result for `args`, computing and storing it on a miss.
    ///
    /// Errors from the wrapped function are returned unchanged and never
    /// stored. Store errors are converted into `E` and returned as well.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let params = params_from(&args)?;
        let key = get_cache_key(&self.name, params.as_ref());

        if let Some(value) = self.lookup(&key).await? {
            return Ok(value);
        }

        let _flight = match &self.service.coalescer {
            Some(coalescer) => {
                let flight = coalescer.acquire(&key).await;
                // Another caller may have filled the slot while we waited
                if let Some(value) = self.lookup(&key).await? {
                    return Ok(value);
                }
                Some(flight)
            }
            None => None,
        };

        debug!("Cache miss: {}", key);
        let value = (self.f)(args).await?;

        let stored = serde_json::to_value(&value).map_err(CacheError::from)?;
        let tags = self.merged_tags(params.as_ref());
        self.service
            .backend
            .set(&key, stored, Some(self.preset.revalidate()), &tags)
            .await?;

        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(stored) = self.service.backend.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(stored) {
            Ok(value) => {
                debug!("Cache hit: {}", key);
                Ok(Some(value))
            }
            Err(e) => {
                warn!("Discarding cached value for {} that no longer decodes: {}", key, e);
                Ok(None)
            }
        }
    }
}

impl<F> fmt::Debug for CachedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFn")
            .field("name", &self.name)
            .field("preset", &self.preset)
            .field("static_tags", &self.static_tags)
            .finish_non_exhaustive()
    }
}

// == Key Coalescer ==
/// Per-key async locks used to serialize concurrent misses.
///
/// Each slot counts the callers holding or waiting on it. The count is taken
/// before the first await, so a caller cancelled while waiting still releases
/// its share, and the slot is dropped once the count reaches zero.
#[derive(Debug, Default)]
struct KeyCoalescer {
    inflight: Mutex<HashMap<String, Slot>>,
}

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    holders: usize,
}

impl KeyCoalescer {
    fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, key: &str) -> FlightGuard<'_> {
        let lock = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = inflight.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                holders: 0,
            });
            slot.holders += 1;
            Arc::clone(&slot.lock)
        };

        let mut flight = FlightGuard {
            coalescer: self,
            key: key.to_string(),
            guard: None,
        };
        flight.guard = Some(lock.lock_owned().await);
        flight
    }

    #[cfg(test)]
    fn slots(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one computation, or while waiting for one.
struct FlightGuard<'a> {
    coalescer: &'a KeyCoalescer,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self
            .coalescer
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.guard.take();

        let idle = match inflight.get_mut(&self.key) {
            Some(slot) => {
                slot.holders = slot.holders.saturating_sub(1);
                slot.holders == 0
            }
            None => false,
        };
        if idle {
            inflight.remove(&self.key);
        }
    }
}
