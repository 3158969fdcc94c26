//! Per-endpoint channel bookkeeping.
//!
//! The registry map is shared by every request task. Only the pool's creation
//! path inserts into it; reading a resource, appending a channel and counting
//! requests are all lock-free.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use fedserve_core::Endpoint;
use rand::Rng;

/// Channels and traffic counters for one endpoint.
#[derive(Debug)]
pub struct ChannelResource<C> {
    endpoint: Endpoint,
    channels: ArcSwap<Vec<C>>,
    /// Only ever incremented.
    request_count: AtomicU64,
    /// Time of the last scaling evaluation in ms, 0 when never evaluated.
    last_check_ms: AtomicU64,
    /// `request_count` as seen by the last scaling evaluation.
    pre_check_count: AtomicU64,
}

impl<C: Clone> ChannelResource<C> {
    pub fn new(endpoint: Endpoint, first: C) -> Self {
        Self::with_channels(endpoint, vec![first])
    }

    pub fn with_channels(endpoint: Endpoint, channels: Vec<C>) -> Self {
        Self {
            endpoint,
            channels: ArcSwap::from_pointee(channels),
            request_count: AtomicU64::new(0),
            last_check_ms: AtomicU64::new(0),
            pre_check_count: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current channel set.
    pub fn channels(&self) -> Arc<Vec<C>> {
        self.channels.load_full()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.load().len()
    }

    /// Append a channel. Concurrent readers keep the set they already loaded.
    pub fn push(&self, channel: C) {
        self.channels.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(channel.clone());
            next
        });
    }

    /// Uniformly random channel, or `None` when the set is empty.
    pub fn pick_random(&self) -> Option<C> {
        let channels = self.channels.load();
        if channels.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..channels.len());
        Some(channels[index].clone())
    }

    /// Count one request, returning the new total.
    pub fn record_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn last_check_ms(&self) -> u64 {
        self.last_check_ms.load(Ordering::Relaxed)
    }

    pub fn pre_check_count(&self) -> u64 {
        self.pre_check_count.load(Ordering::Relaxed)
    }

    /// Requests counted since the last scaling evaluation.
    pub fn requests_since_check(&self) -> u64 {
        self.request_count().saturating_sub(self.pre_check_count())
    }

    /// Record a scaling evaluation at `now_ms` that saw `request_count`.
    ///
    /// Returns the previous `(last_check_ms, pre_check_count)` pair.
    pub(crate) fn rebaseline(&self, now_ms: u64, request_count: u64) -> (u64, u64) {
        let last = self.last_check_ms.swap(now_ms, Ordering::Relaxed);
        let pre = self.pre_check_count.swap(request_count, Ordering::Relaxed);
        (last, pre)
    }
}

/// Point-in-time view of one endpoint, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub endpoint: String,
    pub channels: usize,
    pub requests: u64,
}

/// Endpoint key to channel resource map.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    resources: DashMap<String, Arc<ChannelResource<C>>>,
}

impl<C: Clone> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ChannelResource<C>>> {
        self.resources.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert a resource. Callers hold the pool's creation lock.
    pub(crate) fn insert(&self, key: String, resource: Arc<ChannelResource<C>>) {
        self.resources.insert(key, resource);
    }

    /// Owned copy of every entry, so callers can await without holding shard
    /// locks.
    pub fn entries(&self) -> Vec<(String, Arc<ChannelResource<C>>)> {
        self.resources
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ResourceSnapshot> {
        let mut snapshot: Vec<_> = self
            .resources
            .iter()
            .map(|entry| ResourceSnapshot {
                endpoint: entry.key().clone(),
                channels: entry.value().channel_count(),
                requests: entry.value().request_count(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.resources.clear();
    }
}

impl<C: Clone> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn endpoint() -> Endpoint {
        Endpoint::new("10.0.0.1", 50051)
    }

    #[test]
    fn test_push_grows_channel_set() {
        let resource = ChannelResource::new(endpoint(), 1u32);
        let before = resource.channels();

        resource.push(2);
        resource.push(3);

        assert_eq!(resource.channel_count(), 3);
        assert_eq!(*resource.channels(), vec![1, 2, 3]);
        // Readers that loaded earlier keep their view.
        assert_eq!(*before, vec![1]);
    }

    #[test]
    fn test_pick_random_stays_in_set() {
        let resource = ChannelResource::with_channels(endpoint(), vec![10u32, 20, 30]);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let picked = resource.pick_random().unwrap();
            assert!([10, 20, 30].contains(&picked));
            seen.insert(picked);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_pick_random_empty() {
        let resource: ChannelResource<u32> = ChannelResource::with_channels(endpoint(), vec![]);
        assert!(resource.pick_random().is_none());
    }

    #[test]
    fn test_request_counter_and_rebaseline() {
        let resource = ChannelResource::new(endpoint(), 1u32);
        for _ in 0..5 {
            resource.record_request();
        }
        assert_eq!(resource.request_count(), 5);
        assert_eq!(resource.requests_since_check(), 5);

        let (last, pre) = resource.rebaseline(1_000, resource.request_count());
        assert_eq!((last, pre), (0, 0));
        assert_eq!(resource.requests_since_check(), 0);
        // The counter itself is never reset.
        assert_eq!(resource.request_count(), 5);
    }

    #[test]
    fn test_registry_snapshot_sorted() {
        let registry = ConnectionRegistry::new();
        registry.insert(
            "b:2".to_string(),
            Arc::new(ChannelResource::new(Endpoint::new("b", 2), 1u32)),
        );
        registry.insert(
            "a:1".to_string(),
            Arc::new(ChannelResource::with_channels(Endpoint::new("a", 1), vec![1, 2])),
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].endpoint, "a:1");
        assert_eq!(snapshot[0].channels, 2);
        assert_eq!(snapshot[1].endpoint, "b:2");
        assert_eq!(registry.entries().len(), 2);
    }
}
