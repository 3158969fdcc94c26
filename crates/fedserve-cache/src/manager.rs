//! Two-tier cache manager.

use std::sync::Arc;
use std::time::Instant;

use fedserve_core::metrics::{record_cache_hit, record_cache_miss, record_cache_rejected};
use fedserve_core::{FederatedParams, FederatedParty, ReturnResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::admission::AdmissionPolicy;
use crate::config::{CacheCategory, CacheConfig, CategorySettings};
use crate::error::{CacheError, Result};
use crate::keys::{RemoteKeyStrategy, inference_result_key};
use crate::local::LocalTier;
use crate::store::SharedStore;

struct CategoryTier {
    settings: CategorySettings,
    local: LocalTier,
}

impl CategoryTier {
    fn new(settings: CategorySettings) -> Self {
        let local = LocalTier::from_settings(&settings);
        Self { settings, local }
    }
}

/// Result cache with a per-process local tier in front of a shared store.
///
/// Reads try the local tier, then the shared store, and copy shared hits
/// into the local tier. Writes go to the local tier and then to the shared
/// store with the category's expiry. Values are JSON-encoded, so any process
/// using the same keys can read them.
///
/// Shared-store errors are returned, not swallowed.
pub struct TieredCacheManager {
    inference: CategoryTier,
    remote_inference: CategoryTier,
    process: CategoryTier,
    store: Arc<dyn SharedStore>,
    admission: AdmissionPolicy,
    remote_enabled: bool,
    key_strategy: RemoteKeyStrategy,
}

impl TieredCacheManager {
    pub fn new(config: &CacheConfig, store: Arc<dyn SharedStore>) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            store = store.kind(),
            retcodes = %config.cacheable_retcodes,
            remote_enabled = config.remote_result_cache_enabled,
            key_strategy = ?config.remote_key_strategy,
            "Result cache initialized"
        );

        Ok(Self {
            inference: CategoryTier::new(config.settings(CacheCategory::InferenceResult)),
            remote_inference: CategoryTier::new(
                config.settings(CacheCategory::RemoteInferenceResult),
            ),
            process: CategoryTier::new(config.settings(CacheCategory::ProcessData)),
            store,
            admission: config.admission_policy()?,
            remote_enabled: config.remote_result_cache_enabled,
            key_strategy: config.remote_key_strategy,
        })
    }

    fn tier(&self, category: CacheCategory) -> &CategoryTier {
        match category {
            CacheCategory::InferenceResult => &self.inference,
            CacheCategory::RemoteInferenceResult => &self.remote_inference,
            CacheCategory::ProcessData => &self.process,
        }
    }

    pub fn settings(&self, category: CacheCategory) -> &CategorySettings {
        &self.tier(category).settings
    }

    pub fn admission(&self) -> &AdmissionPolicy {
        &self.admission
    }

    pub fn remote_key_strategy(&self) -> RemoteKeyStrategy {
        self.key_strategy
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// Look up `key`, local tier first.
    ///
    /// A value that exists but does not decode as `T` is reported as
    /// [`CacheError::Corruption`] rather than a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        category: CacheCategory,
        key: &str,
    ) -> Result<Option<T>> {
        let tier = self.tier(category);

        if let Some(bytes) = tier.local.get(key).await {
            tracing::debug!(category = %category, key = %key, "cache hit (local)");
            record_cache_hit(category.as_str(), "local");
            return decode(key, &bytes).map(Some);
        }

        match self.store.get(tier.settings.namespace, key).await? {
            Some(bytes) => {
                let value = decode(key, &bytes)?;
                tier.local.insert(key.to_string(), Arc::new(bytes)).await;
                tracing::debug!(category = %category, key = %key, "cache hit (shared)");
                record_cache_hit(category.as_str(), "shared");
                Ok(Some(value))
            }
            None => {
                tracing::debug!(category = %category, key = %key, "cache miss");
                record_cache_miss(category.as_str());
                Ok(None)
            }
        }
    }

    /// Write `value` to both tiers. The shared entry expires after the
    /// category's TTL plus jitter.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        category: CacheCategory,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let tier = self.tier(category);
        let bytes = Arc::new(serde_json::to_vec(value).map_err(|source| {
            CacheError::Serialization {
                key: key.to_string(),
                source,
            }
        })?);

        tier.local.insert(key.to_string(), Arc::clone(&bytes)).await;

        let ttl_secs = tier.settings.expiry_secs();
        self.store
            .set_with_expiry(tier.settings.namespace, key, &bytes, ttl_secs)
            .await
    }

    /// Drop `key` from the local tier only.
    pub async fn invalidate_local(&self, category: CacheCategory, key: &str) {
        self.tier(category).local.invalidate(key).await;
    }

    pub fn local_contains(&self, category: CacheCategory, key: &str) -> bool {
        self.tier(category).local.contains(key)
    }

    /// Store intermediate data for a later processing stage.
    pub async fn store_process_data<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        tracing::debug!(key = %key, "store process data");
        self.put(CacheCategory::ProcessData, key, value).await
    }

    pub async fn restore_process_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let value = self.get(CacheCategory::ProcessData, key).await?;
        tracing::debug!(key = %key, found = value.is_some(), "restore process data");
        Ok(value)
    }

    /// Cache this party's result for `case_id`. Returns `false` without
    /// touching either tier when the result code is not cacheable.
    pub async fn put_inference_result(
        &self,
        party_id: &str,
        case_id: &str,
        result: &ReturnResult,
    ) -> Result<bool> {
        let started = Instant::now();
        let key = inference_result_key(party_id, case_id);
        let outcome = self
            .put_admitted(CacheCategory::InferenceResult, &key, result)
            .await;
        tracing::debug!(
            case_id = %case_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "put inference result"
        );
        outcome
    }

    pub async fn get_inference_result(
        &self,
        party_id: &str,
        case_id: &str,
    ) -> Result<Option<ReturnResult>> {
        let key = inference_result_key(party_id, case_id);
        self.get(CacheCategory::InferenceResult, &key).await
    }

    /// Cache a result returned by remote parties for `params`. Returns
    /// `false` when remote-result caching is switched off or the result
    /// code is not cacheable.
    pub async fn put_remote_inference_result(
        &self,
        params: &FederatedParams,
        result: &ReturnResult,
    ) -> Result<bool> {
        self.put_remote_inference_result_for(params, &params.local, result)
            .await
    }

    /// Like [`put_remote_inference_result`](Self::put_remote_inference_result),
    /// keyed for `party` when the composite key strategy is active.
    pub async fn put_remote_inference_result_for(
        &self,
        params: &FederatedParams,
        party: &FederatedParty,
        result: &ReturnResult,
    ) -> Result<bool> {
        if !self.remote_enabled {
            return Ok(false);
        }
        let key = self.key_strategy.derive_for(params, party);
        self.put_admitted(CacheCategory::RemoteInferenceResult, &key, result)
            .await
    }

    /// Returns `None` when remote-result caching is switched off.
    pub async fn get_remote_inference_result(
        &self,
        params: &FederatedParams,
    ) -> Result<Option<ReturnResult>> {
        self.get_remote_inference_result_for(params, &params.local)
            .await
    }

    pub async fn get_remote_inference_result_for(
        &self,
        params: &FederatedParams,
        party: &FederatedParty,
    ) -> Result<Option<ReturnResult>> {
        if !self.remote_enabled {
            return Ok(None);
        }
        let key = self.key_strategy.derive_for(params, party);
        self.get(CacheCategory::RemoteInferenceResult, &key).await
    }

    async fn put_admitted(
        &self,
        category: CacheCategory,
        key: &str,
        result: &ReturnResult,
    ) -> Result<bool> {
        if !self.admission.admits(result.retcode) {
            tracing::debug!(
                category = %category,
                key = %key,
                retcode = result.retcode,
                "result not cacheable"
            );
            record_cache_rejected(category.as_str(), result.retcode);
            return Ok(false);
        }
        self.put(category, key, result).await?;
        tracing::debug!(category = %category, key = %key, "result cached");
        Ok(true)
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| CacheError::Corruption {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> TieredCacheManager {
        TieredCacheManager::new(&CacheConfig::default(), Arc::new(MemoryStore::new())).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = manager();
        cache
            .put(CacheCategory::ProcessData, "k", &vec![1, 2, 3])
            .await
            .unwrap();

        let value: Option<Vec<i32>> = cache.get(CacheCategory::ProcessData, "k").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_categories_do_not_share_local_tiers() {
        let cache = manager();
        cache
            .put(CacheCategory::ProcessData, "k", "v")
            .await
            .unwrap();

        assert!(cache.local_contains(CacheCategory::ProcessData, "k"));
        assert!(!cache.local_contains(CacheCategory::InferenceResult, "k"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            cacheable_retcodes: "zero".into(),
            ..CacheConfig::default()
        };
        assert!(TieredCacheManager::new(&config, Arc::new(MemoryStore::new())).is_err());
    }
}
