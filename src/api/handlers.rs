//! API Handlers
//!
//! HTTP request handlers for each tag cache endpoint.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{shared, SharedStore, TagStore};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fetch::CacheService;
use crate::keys::get_cache_key;
use crate::models::{
    DeleteResponse, DeriveKeyRequest, EntryResponse, HealthResponse, InvalidateKeysRequest,
    InvalidateResponse, InvalidateTagsRequest, KeyResponse, PresetResponse, SetEntryRequest,
    SetResponse, StatsResponse,
};
use crate::presets::CachePreset;

/// Application state shared across all handlers.
///
/// `cache` and `service` point at the same store: entry handlers work on the
/// store directly, invalidation goes through the service like any other caller.
#[derive(Clone)]
pub struct AppState {
    /// Shared tag store
    pub cache: SharedStore,
    /// Cache service over `cache`
    pub service: CacheService,
    /// TTL in seconds applied to writes without one
    pub default_ttl: u64,
}

impl AppState {
    /// Creates a new AppState around `store`.
    pub fn new(store: TagStore, default_ttl: u64) -> Self {
        let cache = shared(store);
        Self {
            service: CacheService::new(cache.clone()),
            cache,
            default_ttl,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut state = Self::new(TagStore::new(config.max_entries), config.default_ttl);
        state.service = state.service.with_single_flight(config.single_flight);
        state
    }
}

/// Handler for PUT /entries
pub async fn set_entry_handler(
    State(state): State<AppState>,
    Json(req): Json<SetEntryRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = Duration::from_secs(req.ttl.unwrap_or(state.default_ttl));
    let mut cache = state.cache.write().await;
    cache.set(req.key.clone(), req.value, Some(ttl), req.tags)?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /entries/:key
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryResponse>> {
    // Write lock: reads update LRU order, stats and drop expired entries
    let mut cache = state.cache.write().await;
    cache.get(&key)?;

    let now = cache.now_ms();
    let entry = cache
        .peek(&key)
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(EntryResponse::from_entry(key.as_str(), entry, now)))
}

/// Handler for DELETE /entries/:key
pub async fn delete_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let mut cache = state.cache.write().await;
    cache.delete(&key)?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /invalidate/keys
pub async fn invalidate_keys_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateKeysRequest>,
) -> Result<Json<InvalidateResponse>> {
    state.service.invalidate_by_key(&req.keys).await?;

    Ok(Json(InvalidateResponse::new("key", req.keys.len())))
}

/// Handler for POST /invalidate/tags
pub async fn invalidate_tags_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateTagsRequest>,
) -> Result<Json<InvalidateResponse>> {
    state.service.invalidate_by_tag(&req.tags).await?;

    Ok(Json(InvalidateResponse::new("tag", req.tags.len())))
}

/// Handler for POST /keys
///
/// Derives the cache key an operation would use, for debugging and for
/// clients that invalidate by key.
pub async fn derive_key_handler(Json(req): Json<DeriveKeyRequest>) -> Result<Json<KeyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    Ok(Json(KeyResponse {
        key: get_cache_key(&req.name, req.params.as_ref()),
    }))
}

/// Handler for GET /presets
pub async fn presets_handler() -> Json<Vec<PresetResponse>> {
    Json(CachePreset::ALL.into_iter().map(PresetResponse::from).collect())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.read().await;

    Json(StatsResponse::from(cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
