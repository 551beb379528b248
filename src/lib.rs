//! tagcache - tag-indexed memoizing cache
//!
//! Wraps async computations so their results are reused for a preset
//! revalidation window, keyed by a canonical rendering of their parameters,
//! and invalidated by key or by tag. Ships with an in-memory store and an
//! HTTP surface for sharing one cache between processes.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod models;
pub mod presets;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{CacheError, Result};
pub use fetch::{CacheService, CachedFn};
pub use keys::{get_cache_key, ParamValue};
pub use presets::CachePreset;
pub use tasks::spawn_cleanup_task;
