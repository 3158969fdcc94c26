//! Composition root owning the connection pool and the result cache.

use std::sync::Arc;

use fedserve_cache::{CacheError, TieredCacheManager, create_shared_store};
use fedserve_pool::{ConnectionPool, GrpcChannel, GrpcChannelFactory, PoolError};
use tracing::{info, instrument};

use crate::config::{ConfigError, GatewayConfig};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache setup failed: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Running gateway components.
///
/// The pool and cache are built once here and handed to request handlers
/// by reference; nothing in the gateway is global.
pub struct Gateway {
    config: GatewayConfig,
    pool: ConnectionPool<GrpcChannelFactory>,
    cache: Arc<TieredCacheManager>,
}

impl Gateway {
    /// Validate `config`, connect the shared store and build the pool.
    ///
    /// With `pool.lazy_scaler = false` the scaler is started here; otherwise
    /// the pool starts it when the first endpoint is registered.
    #[instrument(skip_all)]
    pub async fn start(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let store = create_shared_store(&config.redis).await?;
        let cache = Arc::new(TieredCacheManager::new(&config.cache, store)?);

        let factory = GrpcChannelFactory::new(config.pool.channel.clone());
        let pool = ConnectionPool::new(&config.pool, factory);
        if !config.pool.lazy_scaler {
            pool.start_scaler();
        }

        info!(
            max_channels_per_endpoint = config.pool.max_channels_per_endpoint,
            load_factor_threshold = config.pool.load_factor_threshold,
            check_interval_ms = config.pool.check_interval_ms,
            redis = config.redis.enabled,
            "Gateway started"
        );

        Ok(Self {
            config,
            pool,
            cache,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool<GrpcChannelFactory> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<TieredCacheManager> {
        &self.cache
    }

    /// Channel to a remote party at `endpoint` (`host:port`).
    pub async fn channel(&self, endpoint: &str) -> Result<GrpcChannel, GatewayError> {
        Ok(self.pool.acquire(endpoint).await?)
    }

    /// Stop the scaler and release every channel.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Gateway stopped");
    }
}
