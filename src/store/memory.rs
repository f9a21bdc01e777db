//! In-process counter store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{CounterStore, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::ratelimit::LimitCounter;

#[derive(Debug, Clone, Copy)]
struct Entry {
    counter: LimitCounter,
    /// Absolute expiry in clock milliseconds.
    expires_at: u64,
}

/// A counter store held in process memory.
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`MemoryStore::purge_expired`], which [`MemoryStore::spawn_sweeper`] calls
/// on an interval. Expiry follows the store's own clock, so a store sharing a
/// [`ManualClock`](crate::clock::ManualClock) with the limiter expires entries
/// in simulated time.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store that expires entries on the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires entries on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining lifetime of the entry under `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| Duration::from_millis(e.expires_at - now))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged = purged, remaining = store.len(), "Purged expired counters");
                }
            }
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<LimitCounter>, StoreError> {
        let now = self.clock.now_ms();
        let entry = self.entries.get(key).map(|e| *e);

        match entry {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.counter)),
            Some(_) => {
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: LimitCounter, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }

        let expires_at = self.clock.now_ms().saturating_add(ttl.as_millis() as u64);
        self.entries.insert(
            key.to_string(),
            Entry {
                counter: value,
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn counter(timestamp: u64, count: u64) -> LimitCounter {
        LimitCounter { timestamp, count }
    }

    #[tokio::test]
    async fn test_missing_key_reads_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("rl_nobody_notes").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryStore::new();
        store
            .set("rl_alice_notes", counter(10, 3), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("rl_alice_notes").await.unwrap(), Some(counter(10, 3)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());

        store
            .set("rl_alice_notes", counter(0, 1), Duration::from_millis(1000))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(999));
        assert!(store.get("rl_alice_notes").await.unwrap().is_some());
        assert_eq!(store.ttl("rl_alice_notes"), Some(Duration::from_millis(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(store.get("rl_alice_notes").await.unwrap(), None);
        // Lazy expiry removed the entry on read
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_deletes() {
        let store = MemoryStore::new();
        store
            .set("rl_alice_notes", counter(0, 1), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .set("rl_alice_notes", counter(0, 2), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(store.get("rl_alice_notes").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());

        store.set("short", counter(0, 1), Duration::from_millis(100)).await.unwrap();
        store.set("long", counter(0, 1), Duration::from_millis(10_000)).await.unwrap();

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_and_stops_with_store() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        store.set("short", counter(0, 1), Duration::from_millis(100)).await.unwrap();

        let handle = store.spawn_sweeper(Duration::from_secs(1));
        clock.advance(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }
}
