//! Cache Store Module
//!
//! Main cache engine: HashMap storage with a secondary tag index, LRU
//! capacity eviction and revalidation windows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, Clock, LruTracker, SystemClock};
use crate::error::{CacheError, Result};

// == Tag Store ==
/// In-memory cache storage with tag-based invalidation.
///
/// Invariant: a key appears in `tag_index[tag]` exactly when the stored entry
/// for that key carries `tag`. Every path that removes an entry goes through
/// `remove_entry`, which keeps the index in step.
#[derive(Debug)]
pub struct TagStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Tag -> keys carrying it
    tag_index: HashMap<String, HashSet<String>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Time source for expiry
    clock: Arc<dyn Clock>,
}

impl TagStore {
    // == Constructor ==
    /// Creates a new TagStore reading time from the system clock.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries the cache can hold
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    /// Creates a new TagStore reading time from `clock`.
    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            clock,
        }
    }

    /// Current time according to the store's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Set ==
    /// Stores a value under `key` with an optional revalidation window and tags.
    ///
    /// Overwriting a key replaces its value, window and tags. If the cache is
    /// at capacity, the least recently used entry is evicted first.
    ///
    /// Only empty keys and empty tags are rejected. Size limits belong to the
    /// HTTP request models, since derived keys grow with their parameters.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Revalidation window, None = never expires
    /// * `tags` - Tags the entry can later be invalidated by
    pub fn set<I, T>(&mut self, key: String, value: Value, ttl: Option<Duration>, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        validate_key(&key)?;
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        validate_tags(&tags)?;

        if self.entries.contains_key(&key) {
            self.remove_entry(&key);
        } else if self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted_key) => {
                    self.remove_entry(&evicted_key);
                    self.stats.record_eviction();
                    debug!("Evicted least recently used entry: {}", evicted_key);
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "Cache is full and eviction failed".to_string(),
                    ));
                }
            }
        }

        for tag in &tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }

        let entry = CacheEntry::new(value, self.now_ms(), ttl, tags);
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);
        self.refresh_sizes();

        Ok(())
    }

    // == Get ==
    /// Retrieves a live value by key.
    ///
    /// Expired entries are removed on read and counted as misses.
    pub fn get(&mut self, key: &str) -> Result<Value> {
        let now = self.now_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return Err(CacheError::NotFound(key.to_string()));
            }
        };

        if expired {
            self.remove_entry(key);
            self.refresh_sizes();
            self.stats.record_miss();
            return Err(CacheError::Expired(key.to_string()));
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries
            .get(key)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| CacheError::Internal(format!("entry vanished during read: {key}")))
    }

    // == Peek ==
    /// Returns a live entry with its metadata without touching LRU or stats.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        let now = self.now_ms();
        self.entries.get(key).filter(|entry| !entry.is_expired(now))
    }

    // == Delete ==
    /// Removes an entry by key, failing if it does not exist.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        if self.remove_entry(key).is_some() {
            self.refresh_sizes();
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    // == Invalidate Keys ==
    /// Expires the named entries immediately.
    ///
    /// Unknown keys and an empty slice are no-ops. Returns the number of
    /// entries removed.
    pub fn invalidate_keys<S: AsRef<str>>(&mut self, keys: &[S]) -> usize {
        let removed = keys
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter(|key| self.remove_entry(key).is_some())
            .count();

        self.stats.record_invalidations(removed);
        self.refresh_sizes();
        debug!("Invalidated {} of {} keys", removed, keys.len());
        removed
    }

    // == Invalidate Tags ==
    /// Expires every entry carrying at least one of `tags`.
    ///
    /// Unknown tags and an empty slice are no-ops. Returns the number of
    /// entries removed.
    pub fn invalidate_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> usize {
        let doomed: HashSet<String> = tags
            .iter()
            .map(AsRef::<str>::as_ref)
            .filter_map(|tag| self.tag_index.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect();

        let removed = doomed
            .iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count();

        self.stats.record_invalidations(removed);
        self.refresh_sizes();
        debug!("Invalidated {} entries across {} tags", removed, tags.len());
        removed
    }

    // == Keys For Tag ==
    /// Returns the keys currently indexed under `tag`, sorted.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_sizes(self.entries.len(), self.tag_index.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        self.refresh_sizes();
        expired_keys.len()
    }

    /// Returns the current number of entries, live or not yet cleaned up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of distinct tags with at least one entry.
    pub fn tag_count(&self) -> usize {
        self.tag_index.len()
    }

    // == Internal Helpers ==
    /// Removes an entry and every reference to it from the LRU and tag index.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);

        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }

        Some(entry)
    }

    fn refresh_sizes(&mut self) {
        self.stats
            .set_sizes(self.entries.len(), self.tag_index.len());
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_tags(tags: &BTreeSet<String>) -> Result<()> {
    if tags.iter().any(|tag| tag.is_empty()) {
        return Err(CacheError::InvalidRequest("Tags cannot be empty".to_string()));
    }
    Ok(())
}
