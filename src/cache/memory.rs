//! In-memory cache backends.
//!
//! Used by tests and by processes running without a reachable Redis. The
//! counter impl keeps the same atomicity contract as the Redis one by doing
//! each mutation inside a single lock acquisition. [`MemoryCounters`] can
//! also be constructed in an unreachable mode that fails every call, which
//! is how tests drive the durable-store fallback path.

use crate::cache::{CacheError, CacheResult, CounterStore, SnapshotCache};
use crate::types::EventId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// In-memory slot counters.
#[derive(Default)]
pub struct MemoryCounters {
    entries: Mutex<HashMap<EventId, i64>>,
    unreachable: AtomicBool,
}

impl MemoryCounters {
    /// Empty counter store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter store whose every call fails, simulating a Redis outage.
    #[must_use]
    pub fn unreachable() -> Self {
        let counters = Self::default();
        counters.unreachable.store(true, Ordering::Relaxed);
        counters
    }

    /// Toggle the simulated outage at runtime.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    fn check_reachable(&self) -> CacheResult<()> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(CacheError::Backend("counter store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryCounters {
    async fn get(&self, event_id: EventId) -> CacheResult<Option<i64>> {
        self.check_reachable()?;
        Ok(self.entries.lock().await.get(&event_id).copied())
    }

    async fn seed(&self, event_id: EventId, slots: i64) -> CacheResult<()> {
        self.check_reachable()?;
        self.entries.lock().await.entry(event_id).or_insert(slots);
        Ok(())
    }

    async fn decrement(&self, event_id: EventId) -> CacheResult<i64> {
        self.check_reachable()?;
        let mut entries = self.entries.lock().await;
        let value = entries.entry(event_id).or_insert(0);
        *value -= 1;
        Ok(*value)
    }

    async fn increment(&self, event_id: EventId) -> CacheResult<i64> {
        self.check_reachable()?;
        let mut entries = self.entries.lock().await;
        let value = entries.entry(event_id).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn overwrite(&self, event_id: EventId, slots: i64) -> CacheResult<()> {
        self.check_reachable()?;
        self.entries.lock().await.insert(event_id, slots);
        Ok(())
    }

    async fn invalidate(&self, event_id: EventId) -> CacheResult<()> {
        self.check_reachable()?;
        self.entries.lock().await.remove(&event_id);
        Ok(())
    }
}

/// In-memory snapshot cache with TTL expiry checked on read.
#[derive(Default)]
pub struct MemorySnapshots {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemorySnapshots {
    /// Empty snapshot cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshots {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn invalidate_family(&self, prefix: &str) -> CacheResult<()> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn decrement_can_go_negative_until_compensated() {
        let counters = MemoryCounters::new();
        let id = EventId::new(1);

        counters.seed(id, 1).await.unwrap();
        assert_eq!(counters.decrement(id).await.unwrap(), 0);
        assert_eq!(counters.decrement(id).await.unwrap(), -1);
        assert_eq!(counters.increment(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn a_losing_seed_does_not_clobber_the_counter() {
        let counters = MemoryCounters::new();
        let id = EventId::new(2);

        counters.seed(id, 5).await.unwrap();
        counters.decrement(id).await.unwrap();

        // A racing reader seeding from the durable value must not restore
        // the consumed slot.
        counters.seed(id, 5).await.unwrap();
        assert_eq!(counters.get(id).await.unwrap(), Some(4));

        counters.overwrite(id, 7).await.unwrap();
        assert_eq!(counters.get(id).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn unreachable_mode_fails_every_call() {
        let counters = MemoryCounters::unreachable();
        let id = EventId::new(1);

        assert!(counters.get(id).await.is_err());
        assert!(counters.seed(id, 5).await.is_err());
        assert!(counters.decrement(id).await.is_err());

        counters.set_unreachable(false);
        assert_eq!(counters.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshots_expire_after_ttl() {
        tokio::time::pause();
        let cache = MemorySnapshots::new();

        cache
            .set("k", "v", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn family_invalidation_is_prefix_scoped() {
        let cache = MemorySnapshots::new();
        cache
            .set("events:list:1:6:", "a", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("events:list:2:6:", "b", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set("stats:admin", "c", Duration::from_secs(60))
            .await
            .unwrap();

        cache.invalidate_family("events:list:").await.unwrap();

        assert_eq!(cache.get("events:list:1:6:").await.unwrap(), None);
        assert_eq!(cache.get("events:list:2:6:").await.unwrap(), None);
        assert_eq!(cache.get("stats:admin").await.unwrap(), Some("c".to_string()));
    }
}
