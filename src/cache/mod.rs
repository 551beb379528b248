//! Cache Module
//!
//! In-memory storage with revalidation windows, a secondary tag index and
//! LRU capacity eviction, plus the async backend seam the fetch layer uses.

mod backend;
mod clock;
mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use backend::{shared, CacheBackend, SharedStore};
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::TagStore;

// == Public Constants ==
// Limits on writes arriving over HTTP. The store itself does not enforce them.

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 4096;

/// Maximum allowed serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

/// Maximum number of tags a single HTTP write may carry
pub const MAX_TAGS_PER_ENTRY: usize = 64;
