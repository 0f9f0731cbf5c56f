//! Redis-backed slot counters.
//!
//! One `INCR`/`DECR`-able key per event, TTL-bounded. Redis's single-threaded
//! command execution makes the decrement atomic across every process sharing
//! the instance, which is the property the reservation controller relies on.

use crate::cache::{keys, ttl, CacheError, CacheResult, CounterStore};
use crate::types::EventId;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Slot counters stored in Redis.
#[derive(Clone)]
pub struct RedisCounters {
    conn_manager: ConnectionManager,
}

impl RedisCounters {
    /// Connect to Redis and build the counter store.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("failed to connect to Redis: {e}")))?;
        Ok(Self { conn_manager })
    }

    /// Build from an existing connection manager (shared with other stores).
    #[must_use]
    pub const fn with_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl CounterStore for RedisCounters {
    async fn get(&self, event_id: EventId) -> CacheResult<Option<i64>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<i64> = conn
            .get(keys::event_slots(event_id))
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))?;
        Ok(value)
    }

    async fn seed(&self, event_id: EventId, slots: i64) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let key = keys::event_slots(event_id);
        let seeded: bool = conn
            .set_nx(&key, slots)
            .await
            .map_err(|e| CacheError::Backend(format!("SETNX failed: {e}")))?;
        if seeded {
            #[allow(clippy::cast_possible_wrap)] // TTL fits comfortably in i64
            let _: () = conn
                .expire(&key, ttl::SLOT_COUNTER.as_secs() as i64)
                .await
                .map_err(|e| CacheError::Backend(format!("EXPIRE failed: {e}")))?;
        }
        Ok(())
    }

    async fn decrement(&self, event_id: EventId) -> CacheResult<i64> {
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn
            .decr(keys::event_slots(event_id), 1)
            .await
            .map_err(|e| CacheError::Backend(format!("DECR failed: {e}")))?;
        Ok(value)
    }

    async fn increment(&self, event_id: EventId) -> CacheResult<i64> {
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn
            .incr(keys::event_slots(event_id), 1)
            .await
            .map_err(|e| CacheError::Backend(format!("INCR failed: {e}")))?;
        Ok(value)
    }

    async fn overwrite(&self, event_id: EventId, slots: i64) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(keys::event_slots(event_id), slots, ttl::SLOT_COUNTER.as_secs())
            .await
            .map_err(|e| CacheError::Backend(format!("SETEX failed: {e}")))?;
        Ok(())
    }

    async fn invalidate(&self, event_id: EventId) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(keys::event_slots(event_id))
            .await
            .map_err(|e| CacheError::Backend(format!("DEL failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    // Requires a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn decrement_is_strictly_decreasing() {
        let counters = RedisCounters::new("redis://127.0.0.1:6379").await.unwrap();
        let id = EventId::new(990_001);

        counters.invalidate(id).await.unwrap();
        counters.seed(id, 3).await.unwrap();
        assert_eq!(counters.get(id).await.unwrap(), Some(3));
        assert_eq!(counters.decrement(id).await.unwrap(), 2);
        assert_eq!(counters.decrement(id).await.unwrap(), 1);
        assert_eq!(counters.increment(id).await.unwrap(), 2);

        counters.invalidate(id).await.unwrap();
        assert_eq!(counters.get(id).await.unwrap(), None);
    }
}
