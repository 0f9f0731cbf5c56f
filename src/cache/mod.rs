//! Cache tier: per-event slot counters and denormalized snapshots.
//!
//! The counter store is the authoritative remaining-slot count while its key
//! is warm; snapshots are disposable read models with TTLs as a safety net
//! against missed invalidations. Connectivity failures are reported as
//! [`CacheError`] and converted to fallback behavior by callers: they are
//! never user-facing.

pub mod counters_redis;
pub mod memory;
pub mod snapshots_redis;

pub use counters_redis::RedisCounters;
pub use memory::{MemoryCounters, MemorySnapshots};
pub use snapshots_redis::RedisSnapshots;

use crate::types::EventId;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A cache-tier failure. Callers treat it as a miss / degraded signal.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// The backend could not be reached or the command failed.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A cached value could not be encoded or decoded.
    #[error("cache encoding error: {0}")]
    Encoding(String),
}

/// Cache TTLs. Counters outlive snapshots by an order of magnitude because
/// they are kept accurate by atomic mutation rather than invalidation.
pub mod ttl {
    use std::time::Duration;

    /// Per-event slot counter.
    pub const SLOT_COUNTER: Duration = Duration::from_secs(3600);
    /// Single-event snapshot.
    pub const EVENT_DATA: Duration = Duration::from_secs(300);
    /// Event-list page snapshot.
    pub const EVENT_LIST: Duration = Duration::from_secs(60);
    /// Aggregate statistics snapshot.
    pub const ADMIN_STATS: Duration = Duration::from_secs(120);
}

/// Cache key derivation.
pub mod keys {
    use crate::types::EventId;

    /// Prefix shared by every event-list page key.
    pub const EVENT_LIST_FAMILY: &str = "events:list:";

    /// Aggregate statistics key.
    pub const ADMIN_STATS: &str = "stats:admin";

    /// Slot counter key for an event.
    #[must_use]
    pub fn event_slots(id: EventId) -> String {
        format!("event:{id}:slots")
    }

    /// Snapshot key for a single event.
    #[must_use]
    pub fn event_data(id: EventId) -> String {
        format!("event:{id}:data")
    }

    /// Snapshot key for one event-list page. The family is fan-shaped by
    /// page, limit and search term, so invalidation always targets the whole
    /// [`EVENT_LIST_FAMILY`] prefix.
    #[must_use]
    pub fn event_list(page: u32, limit: u32, search: Option<&str>) -> String {
        format!("{EVENT_LIST_FAMILY}{page}:{limit}:{}", search.unwrap_or(""))
    }
}

/// Atomic per-event slot counters.
///
/// While a counter key is present it is the authoritative remaining-slot
/// count; [`decrement`](CounterStore::decrement) is the sole oversell
/// prevention mechanism. Every implementation must make increment/decrement
/// atomic with respect to concurrent callers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current counter, `None` when the key is cold.
    async fn get(&self, event_id: EventId) -> CacheResult<Option<i64>>;

    /// Populate the counter from the durable value, only if the key is
    /// absent. First-reader-populates: a seed that loses the race leaves the
    /// existing (possibly already decremented) value untouched.
    async fn seed(&self, event_id: EventId, slots: i64) -> CacheResult<()>;

    /// Atomically decrement and return the new value. May go negative; the
    /// caller compensates before the value can be observed externally.
    async fn decrement(&self, event_id: EventId) -> CacheResult<i64>;

    /// Atomically increment and return the new value.
    async fn increment(&self, event_id: EventId) -> CacheResult<i64>;

    /// Overwrite the counter, refreshing its TTL. Used to clamp a counter
    /// that drifted above capacity.
    async fn overwrite(&self, event_id: EventId, slots: i64) -> CacheResult<()>;

    /// Drop the counter key.
    async fn invalidate(&self, event_id: EventId) -> CacheResult<()>;
}

/// Keyed snapshot cache for denormalized read models.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Fetch a snapshot, `None` on miss.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a snapshot with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Drop a single snapshot.
    async fn invalidate(&self, key: &str) -> CacheResult<()>;

    /// Drop every snapshot whose key starts with `prefix`.
    async fn invalidate_family(&self, prefix: &str) -> CacheResult<()>;
}
