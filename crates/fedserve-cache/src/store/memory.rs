//! In-process shared store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::SharedStore;
use crate::error::Result;

/// Entry bound used by [`MemoryStore::new`].
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Every this many writes the whole map is swept for expired entries.
const SWEEP_EVERY_WRITES: u64 = 1024;

#[derive(Clone, Debug)]
struct StoredEntry {
    data: Vec<u8>,
    /// `None` when the TTL is beyond what `Instant` can represent.
    expires_at: Option<Instant>,
    ttl: Duration,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// `SharedStore` kept in a `DashMap`, keyed by namespace and key.
///
/// Expired entries read as absent and are removed on read, by a periodic sweep
/// over all entries, and before evicting for room. The map never
/// holds more than `max_entries`; when full of live entries, the one closest
/// to expiry is evicted. The read and write counters let tests assert which
/// tier served a value.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<(u8, String), StoredEntry>,
    max_entries: usize,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of `get` calls served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `set_with_expiry` calls served so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Whether a live entry exists. Does not count as a read.
    pub fn contains(&self, namespace: u8, key: &str) -> bool {
        self.entries
            .get(&(namespace, key.to_string()))
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Expiry the entry was written with, if it exists.
    pub fn ttl_of(&self, namespace: u8, key: &str) -> Option<Duration> {
        self.entries
            .get(&(namespace, key.to_string()))
            .map(|entry| entry.ttl)
    }

    /// Entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "purged expired shared store entries");
        }
        removed
    }

    fn make_room(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| {
                let expires_at = entry.value().expires_at;
                (expires_at.is_none(), expires_at)
            })
            .map(|entry| entry.key().clone());
        if let Some(victim) = victim {
            self.entries.remove(&victim);
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, namespace: u8, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let id = (namespace, key.to_string());
        let expired = match self.entries.get(&id) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(&id, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        namespace: u8,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<()> {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            self.purge_expired();
        }

        let id = (namespace, key.to_string());
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&id) {
            self.make_room();
        }

        let ttl = Duration::from_secs(ttl_secs);
        self.entries.insert(
            id,
            StoredEntry {
                data: value.to_vec(),
                expires_at: Instant::now().checked_add(ttl),
                ttl,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.set_with_expiry(1, "k", b"one", 60).await.unwrap();
        store.set_with_expiry(2, "k", b"two", 60).await.unwrap();

        assert_eq!(store.get(1, "k").await.unwrap().unwrap(), b"one");
        assert_eq!(store.get(2, "k").await.unwrap().unwrap(), b"two");
        assert!(store.get(3, "k").await.unwrap().is_none());
        assert_eq!(store.reads(), 3);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_reads_as_absent() {
        let store = MemoryStore::new();
        store.set_with_expiry(0, "k", b"v", 0).await.unwrap();

        assert!(!store.contains(0, "k"));
        assert!(store.get(0, "k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept_without_reads() {
        let store = MemoryStore::new();
        for i in 0..10_000 {
            store
                .set_with_expiry(0, &format!("party_case-{i}"), b"v", 0)
                .await
                .unwrap();
        }
        assert!(store.len() < SWEEP_EVERY_WRITES as usize);

        store.set_with_expiry(0, "live", b"v", 60).await.unwrap();
        store.purge_expired();

        assert_eq!(store.len(), 1);
        assert!(store.contains(0, "live"));
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_full_store_evicts_entry_closest_to_expiry() {
        let store = MemoryStore::with_max_entries(3);
        for (i, ttl) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            store
                .set_with_expiry(0, &format!("k{i}"), b"v", ttl)
                .await
                .unwrap();
        }

        assert_eq!(store.len(), 3);
        assert!(!store.contains(0, "k0"));
        assert!(!store.contains(0, "k1"));
        assert!(store.contains(0, "k2"));
        assert!(store.contains(0, "k4"));
    }

    #[tokio::test]
    async fn test_full_store_prefers_dropping_expired_entries() {
        let store = MemoryStore::with_max_entries(2);
        store.set_with_expiry(0, "stale", b"v", 0).await.unwrap();
        store.set_with_expiry(0, "a", b"v", 10).await.unwrap();
        store.set_with_expiry(0, "b", b"v", 20).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.contains(0, "a"));
        assert!(store.contains(0, "b"));
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_keeps_other_entries() {
        let store = MemoryStore::with_max_entries(2);
        store.set_with_expiry(0, "a", b"1", 10).await.unwrap();
        store.set_with_expiry(0, "b", b"1", 20).await.unwrap();
        store.set_with_expiry(0, "a", b"2", 30).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0, "a").await.unwrap().unwrap(), b"2");
        assert!(store.contains(0, "b"));
    }

    #[tokio::test]
    async fn test_ttl_is_recorded() {
        let store = MemoryStore::new();
        store.set_with_expiry(0, "k", b"v", 305).await.unwrap();
        assert_eq!(store.ttl_of(0, "k"), Some(Duration::from_secs(305)));
    }
}
