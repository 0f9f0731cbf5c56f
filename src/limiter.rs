//! Admission limiter.
//!
//! Gates requests before they reach the reservation controller. The
//! preferred backend counts in Redis (atomic `INCR` plus `EXPIRE` per window
//! key), which keeps one consistent view across every process. When Redis is
//! unconfigured, or a round-trip fails mid-flight, the limiter degrades to a
//! per-process window: failing open toward availability rather than closed
//! toward strictness. The degradation is logged, never surfaced.

use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Window parameters for one limiter.
#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    /// Maximum requests per window.
    pub max: u32,
    /// Window length.
    pub window: Duration,
}

/// Sliding/fixed-window request limiter per client key.
pub struct AdmissionLimiter {
    settings: LimiterSettings,
    redis: Option<ConnectionManager>,
    local: MemoryWindow,
}

impl AdmissionLimiter {
    /// Build a limiter. Pass `None` to run on the process-local window only.
    #[must_use]
    pub fn new(settings: LimiterSettings, redis: Option<ConnectionManager>) -> Self {
        Self {
            settings,
            redis,
            local: MemoryWindow::default(),
        }
    }

    /// Whether a request under `key` is admitted in the current window.
    pub async fn allow(&self, key: &str) -> bool {
        if let Some(conn) = &self.redis {
            match self.allow_shared(conn.clone(), key).await {
                Ok(allowed) => {
                    if !allowed {
                        debug!(key, "request rejected by shared window");
                    }
                    return allowed;
                }
                Err(e) => {
                    warn!(key, error = %e, "shared window unavailable, using local window");
                }
            }
        }
        self.local.allow(key, self.settings)
    }

    /// Fixed window in Redis: one counter key per (client key, window
    /// index), bumped atomically and expired with the window.
    async fn allow_shared(
        &self,
        mut conn: ConnectionManager,
        key: &str,
    ) -> Result<bool, redis::RedisError> {
        let window_secs = self.settings.window.as_secs().max(1);
        let bucket = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
            / window_secs;
        let window_key = format!("rl:{key}:{bucket}");

        #[allow(clippy::cast_possible_wrap)] // window lengths are small
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&window_key, 1)
            .expire(&window_key, window_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= u64::from(self.settings.max))
    }
}

/// Process-local sliding window: pruned timestamp list per key.
#[derive(Default)]
struct MemoryWindow {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MemoryWindow {
    fn allow(&self, key: &str, settings: LimiterSettings) -> bool {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let timestamps = entries.entry(key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < settings.window);

        if timestamps.len() >= settings.max as usize {
            debug!(key, "request rejected by local window");
            return false;
        }
        timestamps.push(now);
        true
    }
}
