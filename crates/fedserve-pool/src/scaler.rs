//! Load-driven channel growth and connectivity probing.
//!
//! A single background task sweeps every endpoint on a fixed schedule. For
//! each one it decides whether to add a channel, then probes every channel
//! and raises an alert for those in `TRANSIENT_FAILURE` or `SHUTDOWN`.
//! Unhealthy channels are reported only; the set never shrinks.

use std::sync::Arc;
use std::time::Duration;

use fedserve_core::{metrics, now_millis};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::channel::{ChannelFactory, ConnectivityState, PooledChannel};
use crate::config::PoolConfig;
use crate::error::Result;
use crate::pool::PoolShared;
use crate::registry::ChannelResource;

/// Thresholds for adding channels to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    /// An endpoint with more channels than this is never grown.
    pub max_channels_per_endpoint: usize,
    /// Requests per second per channel above which a channel is added.
    pub load_factor_threshold: u64,
}

impl ScalingPolicy {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            max_channels_per_endpoint: config.max_channels_per_endpoint,
            load_factor_threshold: config.load_factor_threshold,
        }
    }

    /// Evaluate `resource` at `now_ms` and decide whether it needs another
    /// channel.
    ///
    /// Every call re-baselines the resource's check timestamp and request
    /// snapshot, whatever the outcome. The first evaluation of a resource only
    /// establishes that baseline and never grows.
    pub fn needs_growth<C: Clone>(&self, resource: &ChannelResource<C>, now_ms: u64) -> bool {
        let request_count = resource.request_count();
        let channel_count = resource.channel_count();
        let (last_check_ms, pre_check_count) = resource.rebaseline(now_ms, request_count);

        let request_delta = request_count.saturating_sub(pre_check_count);
        let elapsed_ms = now_ms.saturating_sub(last_check_ms);
        let load = load_factor(request_delta, channel_count, elapsed_ms);

        if channel_count > self.max_channels_per_endpoint {
            return false;
        }
        if last_check_ms == 0 {
            return false;
        }
        if channel_count == 0 {
            return true;
        }
        load > self.load_factor_threshold
    }
}

/// Average requests per second per channel over `elapsed_ms`.
///
/// A zero channel count or zero elapsed time yields 0.
pub fn load_factor(request_delta: u64, channel_count: usize, elapsed_ms: u64) -> u64 {
    let denominator = (channel_count as u64).saturating_mul(elapsed_ms);
    request_delta
        .saturating_mul(1000)
        .checked_div(denominator)
        .unwrap_or(0)
}

/// Outcome of one sweep over all endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of endpoints evaluated.
    pub endpoints: usize,
    /// Endpoints that received a new channel.
    pub grown: Vec<String>,
    /// One entry per unhealthy channel.
    pub unhealthy: Vec<(String, ConnectivityState)>,
    /// Endpoints whose evaluation failed.
    pub failed: Vec<String>,
}

impl<F: ChannelFactory> PoolShared<F> {
    /// Evaluate every known endpoint once. Failures are isolated per endpoint.
    pub(crate) async fn sweep(&self, now_ms: u64) -> SweepReport {
        let entries = self.registry.entries();
        let mut report = SweepReport {
            endpoints: entries.len(),
            ..SweepReport::default()
        };

        for (key, resource) in entries {
            if let Err(e) = self.check_endpoint(&key, &resource, now_ms, &mut report).await {
                error!(endpoint = %key, error = %e, "Channel check failed");
                metrics::record_scaler_error(&key);
                report.failed.push(key);
            }
        }

        report
    }

    async fn check_endpoint(
        &self,
        key: &str,
        resource: &ChannelResource<F::Channel>,
        now_ms: u64,
        report: &mut SweepReport,
    ) -> Result<()> {
        info!(
            endpoint = %key,
            channels = resource.channel_count(),
            requests = resource.requests_since_check(),
            "Pool check"
        );

        if self.policy.needs_growth(resource, now_ms) {
            let channel = self.factory.create(resource.endpoint()).await?;
            resource.push(channel);
            metrics::record_channel_created(key);
            info!(
                endpoint = %key,
                channels = resource.channel_count(),
                "Added channel to endpoint"
            );
            report.grown.push(key.to_string());
        }
        metrics::set_pool_channels(key, resource.channel_count());

        for channel in resource.channels().iter() {
            let state = channel.connectivity().await;
            if state.is_unhealthy() {
                error!(endpoint = %key, state = %state, "gRPC channel unhealthy");
                metrics::record_unhealthy_channel(key, state.as_str());
                report.unhealthy.push((key.to_string(), state));
            }
        }

        Ok(())
    }
}

/// Running scaler task. Dropping the handle stops the task at its next
/// wake-up.
#[derive(Debug)]
pub(crate) struct ScalerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScalerHandle {
    pub(crate) fn spawn<F: ChannelFactory>(
        shared: Arc<PoolShared<F>>,
        initial_delay: Duration,
        period: Duration,
    ) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                initial_delay_ms = initial_delay.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "Pool scaler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = shared.sweep(now_millis()).await;
                        debug!(
                            endpoints = report.endpoints,
                            grown = report.grown.len(),
                            unhealthy = report.unhealthy.len(),
                            failed = report.failed.len(),
                            "Pool sweep finished"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Pool scaler stopped");
        });

        Self { shutdown, task }
    }

    /// Ask the task to stop without waiting for it.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the task and wait for it to finish.
    pub(crate) async fn stop(self) {
        self.signal();
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!(error = %e, "Pool scaler task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedserve_core::Endpoint;

    fn policy(max: usize, threshold: u64) -> ScalingPolicy {
        ScalingPolicy {
            max_channels_per_endpoint: max,
            load_factor_threshold: threshold,
        }
    }

    fn resource_with(channels: Vec<u32>, requests: u64) -> ChannelResource<u32> {
        let resource = ChannelResource::with_channels(Endpoint::new("10.0.0.1", 50051), channels);
        for _ in 0..requests {
            resource.record_request();
        }
        resource
    }

    #[test]
    fn test_load_factor() {
        assert_eq!(load_factor(100, 1, 1000), 100);
        assert_eq!(load_factor(100, 2, 1000), 50);
        assert_eq!(load_factor(11, 1, 1000), 11);
        assert_eq!(load_factor(5, 0, 1000), 0);
        assert_eq!(load_factor(5, 1, 0), 0);
    }

    #[test]
    fn test_first_evaluation_only_baselines() {
        let resource = resource_with(vec![1], 1_000_000);
        assert!(!policy(8, 10).needs_growth(&resource, 5_000));
        assert_eq!(resource.last_check_ms(), 5_000);
        assert_eq!(resource.pre_check_count(), 1_000_000);
    }

    #[test]
    fn test_first_evaluation_with_no_channels_does_not_grow() {
        let resource = resource_with(vec![], 0);
        assert!(!policy(8, 10).needs_growth(&resource, 5_000));
    }

    #[test]
    fn test_grows_when_no_channels() {
        let resource = resource_with(vec![], 0);
        let policy = policy(8, 10);
        policy.needs_growth(&resource, 1_000);
        assert!(policy.needs_growth(&resource, 2_000));
    }

    #[test]
    fn test_never_grows_above_max() {
        let resource = resource_with(vec![1, 2, 3], 0);
        let policy = policy(2, 10);
        policy.needs_growth(&resource, 1_000);
        for _ in 0..10_000 {
            resource.record_request();
        }
        assert!(!policy.needs_growth(&resource, 2_000));
    }

    #[test]
    fn test_grows_at_max_boundary() {
        // Growth is blocked only when the count exceeds the maximum.
        let resource = resource_with(vec![1, 2], 0);
        let policy = policy(2, 10);
        policy.needs_growth(&resource, 1_000);
        for _ in 0..100 {
            resource.record_request();
        }
        assert!(policy.needs_growth(&resource, 2_000));
    }

    #[test]
    fn test_threshold_is_strict() {
        let resource = resource_with(vec![1], 0);
        let policy = policy(8, 10);
        policy.needs_growth(&resource, 1_000);

        for _ in 0..10 {
            resource.record_request();
        }
        // 10 requests over 1s on one channel: load factor 10, not above 10.
        assert!(!policy.needs_growth(&resource, 2_000));

        for _ in 0..11 {
            resource.record_request();
        }
        assert!(policy.needs_growth(&resource, 3_000));
    }

    #[test]
    fn test_every_evaluation_rebaselines() {
        let resource = resource_with(vec![1], 0);
        let policy = policy(8, 10);
        policy.needs_growth(&resource, 1_000);
        for _ in 0..50 {
            resource.record_request();
        }
        assert!(policy.needs_growth(&resource, 2_000));
        assert_eq!(resource.pre_check_count(), 50);
        assert_eq!(resource.last_check_ms(), 2_000);

        // No new traffic since the last check.
        assert!(!policy.needs_growth(&resource, 3_000));
    }

    #[test]
    fn test_zero_elapsed_does_not_grow() {
        let resource = resource_with(vec![1], 0);
        let policy = policy(8, 10);
        policy.needs_growth(&resource, 1_000);
        for _ in 0..1_000 {
            resource.record_request();
        }
        assert!(!policy.needs_growth(&resource, 1_000));
    }
}
