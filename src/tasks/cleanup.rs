//! Cache Cleanup Task
//!
//! Background task that periodically sweeps expired entries and trims the
//! store back to capacity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Shortest period the sweep will run at.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a background task that periodically runs [`CacheStore::cleanup`].
///
/// Intervals shorter than [`MIN_CLEANUP_INTERVAL`] are raised to it.
///
/// The task runs until its handle is aborted; dropping the handle does not
/// stop it.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(CacheStore::<String>::new(1000, ttl)));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(cache: Arc<RwLock<CacheStore<V>>>, interval: Duration) -> JoinHandle<()>
where
    V: Send + Sync + 'static,
{
    let interval = interval.max(MIN_CLEANUP_INTERVAL);

    tokio::spawn(async move {
        info!("Starting cache cleanup task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let (removed, remaining) = {
                let mut cache_guard = cache.write().await;
                let removed = cache_guard.cleanup();
                (removed, cache_guard.len())
            };

            if removed > 0 {
                info!("Cache cleanup: removed {} expired entries", removed);
            } else {
                debug!("Cache cleanup: no expired entries, {} remaining", remaining);
            }
        }
    })
}
