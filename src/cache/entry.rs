//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with a revalidation
//! window and tag set.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

// == Cache Entry ==
/// Represents a single memoized value with its freshness and tag metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value, opaque to the cache
    pub value: Value,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Tags this entry can be invalidated by
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped at `now_ms`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `now_ms` - Creation time in Unix milliseconds
    /// * `ttl` - Optional revalidation window
    /// * `tags` - Tags associated with the entry
    pub fn new(value: Value, now_ms: u64, ttl: Option<Duration>, tags: BTreeSet<String>) -> Self {
        let expires_at = ttl.map(|ttl| now_ms.saturating_add(ttl.as_millis() as u64));

        Self {
            value,
            created_at: now_ms,
            expires_at,
            tags,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has passed its revalidation window at `now_ms`.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to the expiration time, so a zero-length window
    /// is never served.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(now_ms))
    }

    /// Returns remaining TTL in whole seconds, or None if no expiration is set.
    pub fn ttl_remaining(&self, now_ms: u64) -> Option<u64> {
        self.ttl_remaining_ms(now_ms).map(|ms| ms / 1000)
    }

    /// Returns true if the entry carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
