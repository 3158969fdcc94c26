//! Connection pool facade.
//!
//! ## Acquisition
//!
//! ```text
//! acquire("host:port")
//!   ├─ resource exists → random channel, count request
//!   └─ first use       → creation lock → re-check → create one channel
//!                        → register resource → count request
//! ```
//!
//! Only the first acquisition of an endpoint takes the creation lock, and
//! the lock is process-wide, so at most one resource is ever created per
//! endpoint. All later acquisitions are lock-free.

use std::sync::Arc;
use std::time::Duration;

use fedserve_core::{Endpoint, metrics, now_millis};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::channel::ChannelFactory;
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::registry::{ChannelResource, ConnectionRegistry, ResourceSnapshot};
use crate::scaler::{ScalerHandle, ScalingPolicy, SweepReport};

/// State shared between request tasks and the scaler task.
pub(crate) struct PoolShared<F: ChannelFactory> {
    pub(crate) registry: ConnectionRegistry<F::Channel>,
    pub(crate) factory: F,
    pub(crate) policy: ScalingPolicy,
    create_lock: tokio::sync::Mutex<()>,
}

/// Adaptive pool of outbound channels, keyed by endpoint.
///
/// Owned by the gateway's composition root and shared by reference with
/// request handlers. Dropping the pool stops its scaler.
pub struct ConnectionPool<F: ChannelFactory> {
    shared: Arc<PoolShared<F>>,
    scaler: Mutex<Option<ScalerHandle>>,
    initial_delay: Duration,
    check_interval: Duration,
    lazy_scaler: bool,
}

impl<F: ChannelFactory> ConnectionPool<F> {
    pub fn new(config: &PoolConfig, factory: F) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                registry: ConnectionRegistry::new(),
                factory,
                policy: ScalingPolicy::from_config(config),
                create_lock: tokio::sync::Mutex::new(()),
            }),
            scaler: Mutex::new(None),
            initial_delay: config.initial_delay(),
            check_interval: config.check_interval(),
            lazy_scaler: config.lazy_scaler,
        }
    }

    /// Get a channel to `endpoint` (`host:port`).
    pub async fn acquire(&self, endpoint: &str) -> Result<F::Channel> {
        let endpoint: Endpoint = endpoint.parse()?;
        self.acquire_endpoint(&endpoint).await
    }

    /// Get a channel to `host:port`.
    pub async fn acquire_host_port(&self, host: &str, port: u16) -> Result<F::Channel> {
        self.acquire_endpoint(&Endpoint::new(host, port)).await
    }

    pub async fn acquire_endpoint(&self, endpoint: &Endpoint) -> Result<F::Channel> {
        let key = endpoint.key();
        match self.shared.registry.get(&key) {
            Some(resource) => pick(&key, &resource),
            None => self.create_resource(endpoint, key).await,
        }
    }

    async fn create_resource(&self, endpoint: &Endpoint, key: String) -> Result<F::Channel> {
        let channel = {
            let _guard = self.shared.create_lock.lock().await;

            if let Some(resource) = self.shared.registry.get(&key) {
                return pick(&key, &resource);
            }

            let channel = self.shared.factory.create(endpoint).await?;
            let resource = ChannelResource::new(endpoint.clone(), channel.clone());
            resource.record_request();
            self.shared.registry.insert(key.clone(), Arc::new(resource));
            channel
        };

        metrics::record_channel_created(&key);
        metrics::set_pool_channels(&key, 1);
        info!(endpoint = %key, "Registered new endpoint");

        if self.lazy_scaler {
            self.start_scaler();
        }

        Ok(channel)
    }

    /// Start the periodic scaler if it is not running.
    ///
    /// Must be called from within a tokio runtime. Returns `false` when a
    /// scaler was already running.
    pub fn start_scaler(&self) -> bool {
        let mut slot = self.scaler.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(ScalerHandle::spawn(
            Arc::clone(&self.shared),
            self.initial_delay,
            self.check_interval,
        ));
        true
    }

    pub fn is_scaler_running(&self) -> bool {
        self.scaler.lock().is_some()
    }

    /// Run one scaling and probing pass now.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(now_millis()).await
    }

    /// Run one scaling and probing pass as if the clock read `now_ms`.
    pub async fn sweep_at(&self, now_ms: u64) -> SweepReport {
        self.shared.sweep(now_ms).await
    }

    /// The resource registered for `endpoint`, if any.
    pub fn resource(&self, endpoint: &str) -> Result<Option<Arc<ChannelResource<F::Channel>>>> {
        let endpoint: Endpoint = endpoint.parse()?;
        Ok(self.shared.registry.get(&endpoint.key()))
    }

    /// Channel and request counts for every endpoint, sorted by endpoint.
    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        self.shared.registry.snapshot()
    }

    pub fn endpoint_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn policy(&self) -> ScalingPolicy {
        self.shared.policy
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Stop the scaler and drop every registered channel.
    pub async fn shutdown(&self) {
        let handle = self.scaler.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
        let endpoints = self.shared.registry.len();
        self.shared.registry.clear();
        debug!(endpoints, "Connection pool shut down");
    }
}

impl<F: ChannelFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.scaler.get_mut().as_ref() {
            handle.signal();
        }
    }
}

fn pick<C: Clone>(key: &str, resource: &ChannelResource<C>) -> Result<C> {
    let channel = resource
        .pick_random()
        .ok_or_else(|| PoolError::NoChannels(key.to_string()))?;
    resource.record_request();
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ConnectivityState, PooledChannel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct TestChannel(usize);

    #[async_trait]
    impl PooledChannel for TestChannel {
        async fn connectivity(&self) -> ConnectivityState {
            ConnectivityState::Ready
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl ChannelFactory for CountingFactory {
        type Channel = TestChannel;

        async fn create(&self, _endpoint: &Endpoint) -> Result<TestChannel> {
            Ok(TestChannel(self.created.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    fn pool() -> ConnectionPool<CountingFactory> {
        let config = PoolConfig {
            lazy_scaler: false,
            ..PoolConfig::default()
        };
        ConnectionPool::new(&config, CountingFactory::default())
    }

    #[tokio::test]
    async fn test_first_acquire_creates_resource() {
        let pool = pool();
        let channel = pool.acquire("10.0.0.1:50051").await.unwrap();

        assert_eq!(channel, TestChannel(1));
        let resource = pool.resource("10.0.0.1:50051").unwrap().unwrap();
        assert_eq!(resource.channel_count(), 1);
        assert_eq!(resource.request_count(), 1);
    }

    #[tokio::test]
    async fn test_repeat_acquire_reuses_channel() {
        let pool = pool();
        for _ in 0..5 {
            assert_eq!(pool.acquire("10.0.0.1:50051").await.unwrap(), TestChannel(1));
        }
        assert_eq!(pool.factory().created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.snapshot()[0].requests, 5);
    }

    #[tokio::test]
    async fn test_host_port_overload_shares_key() {
        let pool = pool();
        pool.acquire_host_port("10.0.0.1", 50051).await.unwrap();
        pool.acquire("10.0.0.1:50051").await.unwrap();
        assert_eq!(pool.endpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let pool = pool();
        let err = pool.acquire("10.0.0.1").await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidEndpoint(_)));
        assert_eq!(pool.endpoint_count(), 0);
    }

    #[tokio::test]
    async fn test_lazy_scaler_starts_on_first_endpoint() {
        let pool = ConnectionPool::new(&PoolConfig::default(), CountingFactory::default());
        assert!(!pool.is_scaler_running());

        pool.acquire("10.0.0.1:50051").await.unwrap();
        assert!(pool.is_scaler_running());
        assert!(!pool.start_scaler());

        pool.shutdown().await;
        assert!(!pool.is_scaler_running());
        assert_eq!(pool.endpoint_count(), 0);
    }
}
