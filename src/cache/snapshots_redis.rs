//! Redis-backed snapshot cache.
//!
//! Family invalidation walks keys with `SCAN MATCH prefix*` rather than
//! `KEYS`, so a large list family never blocks the server.

use crate::cache::{CacheError, CacheResult, SnapshotCache};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Snapshot cache stored in Redis.
#[derive(Clone)]
pub struct RedisSnapshots {
    conn_manager: ConnectionManager,
}

impl RedisSnapshots {
    /// Connect to Redis and build the snapshot cache.
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
impl SnapshotCache for RedisSnapshots {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(format!("SETEX failed: {e}")))?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Backend(format!("DEL failed: {e}")))?;
        Ok(())
    }

    async fn invalidate_family(&self, prefix: &str) -> CacheResult<()> {
        let mut scan_conn = self.conn_manager.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = scan_conn
                .scan_match::<_, String>(format!("{prefix}*"))
                .await
                .map_err(|e| CacheError::Backend(format!("SCAN failed: {e}")))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(keys)
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
    async fn family_invalidation_spares_other_prefixes() {
        let cache = RedisSnapshots::new("redis://127.0.0.1:6379").await.unwrap();

        cache
            .set("snaptest:list:1", "a", Duration::from_secs(30))
            .await
            .unwrap();
        cache
            .set("snaptest:list:2", "b", Duration::from_secs(30))
            .await
            .unwrap();
        cache
            .set("snaptest:other", "c", Duration::from_secs(30))
            .await
            .unwrap();

        cache.invalidate_family("snaptest:list:").await.unwrap();

        assert_eq!(cache.get("snaptest:list:1").await.unwrap(), None);
        assert_eq!(cache.get("snaptest:list:2").await.unwrap(), None);
        assert_eq!(cache.get("snaptest:other").await.unwrap(), Some("c".into()));

        cache.invalidate("snaptest:other").await.unwrap();
    }
}
