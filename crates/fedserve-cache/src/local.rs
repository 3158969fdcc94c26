//! In-process tier backed by a bounded moka cache.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::config::CategorySettings;

/// Bounded local cache of encoded values.
///
/// Entries expire once they have gone `ttl` without a read or write. The
/// size bound is approximate: moka evicts asynchronously.
#[derive(Clone)]
pub struct LocalTier {
    cache: Cache<String, Arc<Vec<u8>>>,
}

impl LocalTier {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_size)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }

    pub fn from_settings(settings: &CategorySettings) -> Self {
        Self::new(settings.local_max_size, settings.local_ttl)
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, value: Arc<Vec<u8>>) {
        self.cache.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions. Tests use this to make `entry_count` exact.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}
