//! Shared (cross-process) cache stores.
//!
//! A store holds encoded values in numbered namespaces with a per-entry
//! expiry. [`RedisStore`] is the production store; [`MemoryStore`] keeps
//! the same contract in-process for single-instance deployments and tests.

mod memory;
mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisConfig, RedisStore, mask_password};

/// Cross-process key/value store used as the second cache tier.
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Read `key` from `namespace`. Expired entries read as absent.
    async fn get(&self, namespace: u8, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` under `key` in `namespace`, expiring after `ttl_secs`.
    /// The namespace switch and the write happen in one atomic round trip.
    async fn set_with_expiry(
        &self,
        namespace: u8,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<()>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// Build the shared store described by `config`.
///
/// A disabled Redis yields an in-process [`MemoryStore`]. An enabled Redis
/// that cannot be reached is an error; there is no silent fallback.
pub async fn create_shared_store(config: &RedisConfig) -> Result<Arc<dyn SharedStore>> {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process shared store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = RedisStore::connect(config).await?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_redis_uses_memory_store() {
        let store = create_shared_store(&RedisConfig::default()).await.unwrap();
        assert_eq!(store.kind(), "memory");
        store.ping().await.unwrap();
    }
}
