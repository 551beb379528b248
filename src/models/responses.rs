//! Response DTOs for the cache HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheEntry, CacheStats};
use crate::presets::CachePreset;

/// Response body for GET /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
    pub tags: Vec<String>,
    /// Whole seconds left in the revalidation window, null if unbounded
    pub ttl_remaining: Option<u64>,
}

impl EntryResponse {
    pub fn from_entry(key: impl Into<String>, entry: &CacheEntry, now_ms: u64) -> Self {
        Self {
            key: key.into(),
            value: entry.value.clone(),
            tags: entry.tags.iter().cloned().collect(),
            ttl_remaining: entry.ttl_remaining(now_ms),
        }
    }
}

/// Response body for PUT /entries
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for POST /invalidate/keys and POST /invalidate/tags
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    /// How many keys or tags the caller asked to invalidate
    pub requested: usize,
}

impl InvalidateResponse {
    /// `kind` is "key" or "tag".
    pub fn new(kind: &str, requested: usize) -> Self {
        Self {
            message: format!("Invalidated by {} ({} requested)", kind, requested),
            requested,
        }
    }
}

/// Response body for POST /keys
#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    pub key: String,
}

/// One row of GET /presets
#[derive(Debug, Clone, Serialize)]
pub struct PresetResponse {
    pub name: &'static str,
    pub revalidate_seconds: u64,
}

impl From<CachePreset> for PresetResponse {
    fn from(preset: CachePreset) -> Self {
        Self {
            name: preset.name(),
            revalidate_seconds: preset.revalidate_seconds(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_entries: usize,
    pub total_tags: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            invalidations: stats.invalidations,
            total_entries: stats.total_entries,
            total_tags: stats.total_tags,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
