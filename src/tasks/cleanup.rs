//! Expiry Sweep Task
//!
//! Background task that periodically drops expired entries from the
//! in-process transport. memcached servers expire entries on their own, so
//! this only runs for the `locmem` backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::LocalTransport;

/// Spawns a background task that periodically removes expired entries.
///
/// # Arguments
/// * `store` - shared in-process transport
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(store: Arc<LocalTransport>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match store.cleanup_expired() {
                Ok(0) => debug!("Expiry sweep: no expired entries found"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(err) => warn!("Expiry sweep failed: {}", err),
            }
        }
    })
}
