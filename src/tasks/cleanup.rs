//! Expiry Cleanup Task
//!
//! Background task that periodically purges expired entries so they do not
//! linger in memory or in the tag index between reads.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedStore;

/// Spawns a background task that periodically removes expired cache entries.
///
/// # Arguments
/// * `cache` - Shared handle to the tag store
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(cache: SharedStore, cleanup_interval_secs: u64) -> JoinHandle<()> {
    // A zero interval would spin; clamp to one second
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let (removed, remaining) = {
                let mut cache_guard = cache.write().await;
                let removed = cache_guard.cleanup_expired();
                (removed, cache_guard.len())
            };

            if removed > 0 {
                info!(
                    "Expiry cleanup: removed {} entries, {} remaining",
                    removed, remaining
                );
            } else {
                debug!("Expiry cleanup: no expired entries found");
            }
        }
    })
}
