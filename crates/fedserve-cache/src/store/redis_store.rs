//! Redis-backed shared store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SharedStore;
use crate::error::{CacheError, Result};

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use Redis as the shared tier. When false an in-process store is used.
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Timeout for acquiring a connection and for each round trip, in ms
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Password, injected into the URL when set
    #[serde(default)]
    pub password: Option<String>,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            password: None,
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connection URL with the configured password applied.
    pub fn connection_url(&self) -> Result<String> {
        let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(self.url.clone());
        };
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| CacheError::config(format!("invalid redis url: {e}")))?;
        url.set_password(Some(password))
            .map_err(|_| CacheError::config("redis url cannot carry a password"))?;
        Ok(url.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.pool_size == 0 {
            return Err(CacheError::config("redis.pool_size must be > 0"));
        }
        if self.timeout_ms == 0 {
            return Err(CacheError::config("redis.timeout_ms must be > 0"));
        }
        url::Url::parse(&self.url)
            .map_err(|e| CacheError::config(format!("invalid redis url: {e}")))?;
        Ok(())
    }
}

/// Hide the password part of a connection URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

/// `SharedStore` on a deadpool Redis pool.
///
/// Namespaces map to Redis logical databases. Every operation selects its
/// database in the same pipeline as the command, so a pooled connection
/// left on another database by an earlier caller is harmless.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    timeout: Duration,
}

impl RedisStore {
    /// Create the pool and verify the server answers.
    #[instrument(skip(config), fields(url = %mask_password(&config.url)))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.timeout();

        let mut redis_config = deadpool_redis::Config::from_url(config.connection_url()?);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::pool(format!("failed to create Redis pool: {e}")))?;

        let store = Self { pool, timeout };
        store.ping().await?;

        tracing::info!(
            pool_size = config.pool_size,
            timeout_ms = config.timeout_ms,
            "Connected to Redis"
        );
        Ok(store)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, namespace: u8, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let (value,): (Option<Vec<u8>>,) = redis::pipe()
                .cmd("SELECT")
                .arg(namespace)
                .ignore()
                .get(key)
                .query_async(&mut conn)
                .await?;
            Ok::<_, CacheError>(value)
        })
        .await
    }

    async fn set_with_expiry(
        &self,
        namespace: u8,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<()> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let () = redis::pipe()
                .atomic()
                .cmd("SELECT")
                .arg(namespace)
                .ignore()
                .set_ex(key, value, ttl_secs)
                .ignore()
                .query_async(&mut conn)
                .await?;
            tracing::debug!(namespace, key = %key, ttl_secs, "shared store set");
            Ok::<_, CacheError>(())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}
