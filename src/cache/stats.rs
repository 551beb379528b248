//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and invalidations.

use serde::Serialize;

// == Cache Stats ==
/// Cache performance and bookkeeping counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Reads that returned a live entry
    pub hits: u64,
    /// Reads that found nothing or an expired entry
    pub misses: u64,
    /// Entries removed to stay under capacity
    pub evictions: u64,
    /// Entries removed by key or tag invalidation
    pub invalidations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current number of distinct tags with at least one entry
    pub total_tags: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Adds `count` removed entries to the invalidation counter.
    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    /// Updates the entry and tag gauges.
    pub fn set_sizes(&mut self, entries: usize, tags: usize) {
        self.total_entries = entries;
        self.total_tags = tags;
    }
}
