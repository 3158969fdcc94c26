//! Two-tier inference result cache.
//!
//! A bounded in-process tier sits in front of a shared store so that
//! gateway processes can reuse each other's results. Values are grouped
//! into [`CacheCategory`] variants, each with its own local bounds, store
//! namespace and expiry.
//!
//! ```ignore
//! let store = create_shared_store(&redis_config).await?;
//! let cache = TieredCacheManager::new(&cache_config, store)?;
//!
//! if cache.put_inference_result("9999", "case-1", &result).await? {
//!     // cached in both tiers
//! }
//! let hit = cache.get_inference_result("9999", "case-1").await?;
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod keys;
pub mod local;
pub mod manager;
pub mod store;

pub use admission::AdmissionPolicy;
pub use config::{CacheCategory, CacheConfig, CategoryConfig, CategorySettings, MAX_NAMESPACE};
pub use error::{CacheError, Result};
pub use keys::{RemoteKeyStrategy, composite_remote_key, hashed_remote_key, inference_result_key};
pub use local::LocalTier;
pub use manager::TieredCacheManager;
pub use store::{MemoryStore, RedisConfig, RedisStore, SharedStore, create_shared_store, mask_password};
