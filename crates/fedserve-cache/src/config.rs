//! Cache categories and their configuration.
//!
//! Each category owns a local tier and a shared-store namespace. Unset
//! options fall back to the category's own defaults:
//!
//! | category | local size | local TTL | shared TTL | jitter |
//! |----------|-----------:|----------:|-----------:|-------:|
//! | inference_result | 1000 | 30s | 300s | 0-9s |
//! | remote_inference_result | 1000 | 30s | 86400s | 0-99s |
//! | process_data | 50000 | 60s | 60s | none |

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::admission::AdmissionPolicy;
use crate::error::{CacheError, Result};
use crate::keys::RemoteKeyStrategy;

/// Highest namespace (database index) accepted by the shared store.
pub const MAX_NAMESPACE: u8 = 15;

/// Upper bound on shared TTL plus jitter, well inside what Redis accepts for
/// `SET .. EX`.
pub const MAX_SHARED_EXPIRY_SECS: u64 = i32::MAX as u64;

/// The kinds of value the gateway caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    /// Results of inferences served by this party, keyed by party and case.
    InferenceResult,
    /// Results returned by remote parties, keyed by model and features.
    RemoteInferenceResult,
    /// Intermediate data shared between processing stages.
    ProcessData,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 3] = [
        CacheCategory::InferenceResult,
        CacheCategory::RemoteInferenceResult,
        CacheCategory::ProcessData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InferenceResult => "inference_result",
            Self::RemoteInferenceResult => "remote_inference_result",
            Self::ProcessData => "process_data",
        }
    }

    /// Built-in settings used when nothing is configured.
    pub fn default_settings(&self) -> CategorySettings {
        match self {
            Self::InferenceResult => CategorySettings {
                local_max_size: 1000,
                local_ttl: Duration::from_secs(30),
                namespace: 0,
                shared_ttl_secs: 300,
                jitter_secs: 10,
            },
            Self::RemoteInferenceResult => CategorySettings {
                local_max_size: 1000,
                local_ttl: Duration::from_secs(30),
                namespace: 0,
                shared_ttl_secs: 86_400,
                jitter_secs: 100,
            },
            Self::ProcessData => CategorySettings {
                local_max_size: 50_000,
                local_ttl: Duration::from_secs(60),
                namespace: 0,
                shared_ttl_secs: 60,
                jitter_secs: 0,
            },
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved settings of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySettings {
    /// Maximum entries in the local tier.
    pub local_max_size: u64,
    /// Local entries expire after this long without access.
    pub local_ttl: Duration,
    /// Shared-store namespace (database index).
    pub namespace: u8,
    /// Base expiry of shared-store entries, in seconds.
    pub shared_ttl_secs: u64,
    /// Exclusive upper bound of the random seconds added to the expiry.
    pub jitter_secs: u64,
}

impl CategorySettings {
    /// Shared-store expiry for a new write: base TTL plus uniform jitter.
    pub fn expiry_secs(&self) -> u64 {
        if self.jitter_secs == 0 {
            return self.shared_ttl_secs;
        }
        self.shared_ttl_secs
            .saturating_add(rand::thread_rng().gen_range(0..self.jitter_secs))
    }
}

/// Per-category overrides. Unset fields keep the category default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default)]
    pub local_max_size: Option<u64>,
    #[serde(default)]
    pub local_ttl_secs: Option<u64>,
    #[serde(default)]
    pub namespace: Option<u8>,
    #[serde(default)]
    pub shared_ttl_secs: Option<u64>,
    #[serde(default)]
    pub jitter_secs: Option<u64>,
}

impl CategoryConfig {
    fn resolve(&self, category: CacheCategory) -> CategorySettings {
        let defaults = category.default_settings();
        CategorySettings {
            local_max_size: self.local_max_size.unwrap_or(defaults.local_max_size),
            local_ttl: self
                .local_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.local_ttl),
            namespace: self.namespace.unwrap_or(defaults.namespace),
            shared_ttl_secs: self.shared_ttl_secs.unwrap_or(defaults.shared_ttl_secs),
            jitter_secs: self.jitter_secs.unwrap_or(defaults.jitter_secs),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub inference_result: CategoryConfig,

    #[serde(default)]
    pub remote_inference_result: CategoryConfig,

    #[serde(default)]
    pub process_data: CategoryConfig,

    /// Comma-separated result codes eligible for caching.
    /// Default: "0,102"
    #[serde(default = "default_cacheable_retcodes")]
    pub cacheable_retcodes: String,

    /// Cache results returned by remote parties.
    /// Default: true
    #[serde(default = "default_remote_result_cache_enabled")]
    pub remote_result_cache_enabled: bool,

    /// Key derivation used for remote results.
    #[serde(default)]
    pub remote_key_strategy: RemoteKeyStrategy,
}

fn default_cacheable_retcodes() -> String {
    "0,102".to_string()
}

fn default_remote_result_cache_enabled() -> bool {
    true
}

impl CacheConfig {
    /// Resolved settings for `category`.
    pub fn settings(&self, category: CacheCategory) -> CategorySettings {
        match category {
            CacheCategory::InferenceResult => self.inference_result.resolve(category),
            CacheCategory::RemoteInferenceResult => self.remote_inference_result.resolve(category),
            CacheCategory::ProcessData => self.process_data.resolve(category),
        }
    }

    pub fn admission_policy(&self) -> Result<AdmissionPolicy> {
        AdmissionPolicy::parse(&self.cacheable_retcodes)
    }

    pub fn validate(&self) -> Result<()> {
        for category in CacheCategory::ALL {
            let settings = self.settings(category);
            if settings.local_max_size == 0 {
                return Err(CacheError::config(format!(
                    "cache.{category}.local_max_size must be > 0"
                )));
            }
            if settings.local_ttl.is_zero() {
                return Err(CacheError::config(format!(
                    "cache.{category}.local_ttl_secs must be > 0"
                )));
            }
            if settings.shared_ttl_secs == 0 {
                return Err(CacheError::config(format!(
                    "cache.{category}.shared_ttl_secs must be > 0"
                )));
            }
            let max_expiry = settings.shared_ttl_secs.checked_add(settings.jitter_secs);
            if max_expiry.is_none_or(|secs| secs > MAX_SHARED_EXPIRY_SECS) {
                return Err(CacheError::config(format!(
                    "cache.{category}.shared_ttl_secs + jitter_secs must be <= {MAX_SHARED_EXPIRY_SECS}"
                )));
            }
            if settings.namespace > MAX_NAMESPACE {
                return Err(CacheError::config(format!(
                    "cache.{category}.namespace must be <= {MAX_NAMESPACE}"
                )));
            }
        }
        self.admission_policy()?;
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            inference_result: CategoryConfig::default(),
            remote_inference_result: CategoryConfig::default(),
            process_data: CategoryConfig::default(),
            cacheable_retcodes: default_cacheable_retcodes(),
            remote_result_cache_enabled: default_remote_result_cache_enabled(),
            remote_key_strategy: RemoteKeyStrategy::default(),
        }
    }
}
