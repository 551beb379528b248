//! Cache Backend Module
//!
//! Async storage seam used by the cached-fetch layer. The in-process
//! [`TagStore`] is the default implementation; a distributed store with tag
//! sets can be dropped in behind the same trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cache::TagStore;
use crate::error::{CacheError, Result};

/// Process-wide handle to the in-memory store.
pub type SharedStore = Arc<RwLock<TagStore>>;

/// Creates a [`SharedStore`] around `store`.
pub fn shared(store: TagStore) -> SharedStore {
    Arc::new(RwLock::new(store))
}

// == Backend Trait ==
/// Key/value store with expiry and tag indexing.
///
/// A missing or expired key is `Ok(None)`. `Err` is reserved for the store
/// itself failing, and callers must surface it rather than treat it as a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads a live value.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes a value with its revalidation window and tags.
    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        tags: &[String],
    ) -> Result<()>;

    /// Expires the named keys. Returns how many entries were removed.
    async fn invalidate_keys(&self, keys: &[String]) -> Result<usize>;

    /// Expires every entry carrying one of `tags`. Returns how many entries were removed.
    async fn invalidate_tags(&self, tags: &[String]) -> Result<usize>;
}

#[async_trait]
impl CacheBackend for RwLock<TagStore> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        // Write lock: reads update LRU order and stats
        let mut store = self.write().await;
        match store.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(CacheError::NotFound(_)) | Err(CacheError::Expired(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        tags: &[String],
    ) -> Result<()> {
        let mut store = self.write().await;
        store.set(key.to_string(), value, ttl, tags.iter().cloned())
    }

    async fn invalidate_keys(&self, keys: &[String]) -> Result<usize> {
        let mut store = self.write().await;
        Ok(store.invalidate_keys(keys))
    }

    async fn invalidate_tags(&self, tags: &[String]) -> Result<usize> {
        let mut store = self.write().await;
        Ok(store.invalidate_tags(tags))
    }
}
