//! Cached read models: single event, event-list pages, aggregate stats.
//!
//! Reads always prefer the snapshot cache and recompute from the durable
//! store on miss. There is no single-flight protection: concurrent misses
//! may recompute the same snapshot redundantly, which is acceptable because
//! recomputation is idempotent and cheap. Cache failures degrade silently
//! to direct store reads.
//!
//! The remaining-slot count is never served from a snapshot: it is overlaid
//! from the counter store on every read, so it stays immediately consistent
//! while list and stats snapshots may lag by up to one TTL.

use crate::cache::{keys, ttl, CounterStore, SnapshotCache};
use crate::error::{BookingError, Result};
use crate::store::{EventStore, StoreError};
use crate::types::{AdminStats, Event, EventId, EventPage};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An event-list page plus its content-derived ETag.
#[derive(Clone, Debug, PartialEq)]
pub struct ListResponse {
    /// The page content.
    pub page: EventPage,
    /// Weak ETag over item ids, update times, slot counts and the total.
    pub etag: String,
}

/// Read-side query service over the snapshot cache.
pub struct EventQueryService {
    store: Arc<dyn EventStore>,
    counters: Arc<dyn CounterStore>,
    snapshots: Arc<dyn SnapshotCache>,
}

impl EventQueryService {
    /// Wire the query service to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        counters: Arc<dyn CounterStore>,
        snapshots: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self {
            store,
            counters,
            snapshots,
        }
    }

    /// Fetch one event, preferring the snapshot cache, with the live counter
    /// overlaid onto `available_slots`.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] when the event does not exist,
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn get_event(&self, id: EventId) -> Result<Event> {
        let key = keys::event_data(id);

        let mut event = match self.cached::<Event>(&key).await {
            Some(event) => event,
            None => {
                let event = self
                    .store
                    .get_event(id)
                    .await
                    .map_err(transient)?
                    .ok_or(BookingError::EventNotFound)?;
                self.cache(&key, &event, ttl::EVENT_DATA).await;
                event
            }
        };

        event.available_slots = self.overlay_slots(&event).await;
        Ok(event)
    }

    /// Fetch one event-list page with ETag.
    ///
    /// # Errors
    ///
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn list_events(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> Result<ListResponse> {
        let key = keys::event_list(page, limit, search);

        let mut result = match self.cached::<EventPage>(&key).await {
            Some(page) => page,
            None => {
                let fresh = self
                    .store
                    .list_events(page, limit, search)
                    .await
                    .map_err(transient)?;
                self.cache(&key, &fresh, ttl::EVENT_LIST).await;
                fresh
            }
        };

        for summary in &mut result.events {
            summary.event.available_slots = self.overlay_slots(&summary.event).await;
        }

        let etag = list_etag(&result);
        Ok(ListResponse { page: result, etag })
    }

    /// Fetch the aggregate statistics snapshot.
    ///
    /// # Errors
    ///
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn get_stats(&self) -> Result<AdminStats> {
        match self.cached::<AdminStats>(keys::ADMIN_STATS).await {
            Some(stats) => Ok(stats),
            None => {
                let stats = self.store.admin_stats().await.map_err(transient)?;
                self.cache(keys::ADMIN_STATS, &stats, ttl::ADMIN_STATS).await;
                Ok(stats)
            }
        }
    }

    /// Current counter value clamped at zero, seeding a cold counter from
    /// the durable value. Counter failures fall back to the durable value.
    async fn overlay_slots(&self, event: &Event) -> i32 {
        match self.counters.get(event.id).await {
            Ok(Some(value)) => {
                #[allow(clippy::cast_possible_truncation)] // counter mirrors an i32 column
                let clamped = value.max(0) as i32;
                clamped
            }
            Ok(None) => {
                if let Err(e) = self
                    .counters
                    .seed(event.id, i64::from(event.available_slots))
                    .await
                {
                    debug!(event_id = %event.id, error = %e, "could not seed slot counter");
                }
                event.available_slots
            }
            Err(e) => {
                debug!(event_id = %event.id, error = %e, "counter read failed, using durable value");
                event.available_slots
            }
        }
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.snapshots.get(key).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(key, error = %e, "discarding undecodable snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "snapshot read failed, treating as miss");
                None
            }
        }
    }

    async fn cache<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(json) => {
                if let Err(e) = self.snapshots.set(key, &json, ttl).await {
                    debug!(key, error = %e, "snapshot write skipped");
                }
            }
            Err(e) => debug!(key, error = %e, "snapshot encode failed"),
        }
    }
}

/// Weak ETag over each item's id, update timestamp and current slot count,
/// plus the total: unchanged pages short-circuit to 304 without
/// re-serializing the payload.
#[must_use]
pub fn list_etag(page: &EventPage) -> String {
    let mut hasher = Sha256::new();
    for summary in &page.events {
        let event = &summary.event;
        hasher.update(
            format!(
                "{}:{}:{}|",
                event.id,
                event.updated_at.timestamp_millis(),
                event.available_slots
            )
            .as_bytes(),
        );
    }
    hasher.update(format!("total:{}", page.total).as_bytes());
    let digest = hasher.finalize();
    format!("W/\"{digest:x}\"")
}

fn transient(e: StoreError) -> BookingError {
    BookingError::Transient(e.to_string())
}
