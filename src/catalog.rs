//! Event catalog writes: create, update, delete.
//!
//! Each write runs the invalidation protocol for the read models it
//! affects: the event's own snapshot and counter, the whole list family,
//! and the aggregate stats. Metadata updates are announced to connected
//! clients.

use crate::cache::{keys, ttl, CounterStore, SnapshotCache};
use crate::error::{BookingError, Result};
use crate::realtime::Broadcaster;
use crate::store::{EventPatch, EventStore, NewEvent, StoreError};
use crate::types::{ChangeEvent, Event, EventId};
use std::sync::Arc;
use tracing::{debug, info};

/// Write-side service for the event catalog.
pub struct CatalogService {
    store: Arc<dyn EventStore>,
    counters: Arc<dyn CounterStore>,
    snapshots: Arc<dyn SnapshotCache>,
    broadcaster: Arc<Broadcaster>,
}

impl CatalogService {
    /// Wire the catalog service to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        counters: Arc<dyn CounterStore>,
        snapshots: Arc<dyn SnapshotCache>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            store,
            counters,
            snapshots,
            broadcaster,
        }
    }

    /// Create an event and warm its caches.
    ///
    /// # Errors
    ///
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn create_event(&self, new: NewEvent) -> Result<Event> {
        let event = self.store.create_event(new).await.map_err(transient)?;

        if let Err(e) = self
            .counters
            .seed(event.id, i64::from(event.available_slots))
            .await
        {
            debug!(event_id = %event.id, error = %e, "could not seed slot counter");
        }
        self.cache_event(&event).await;
        self.invalidate_list_models().await;

        info!(event_id = %event.id, total_slots = event.total_slots, "event created");
        Ok(event)
    }

    /// Apply a metadata patch and re-run invalidation.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] when the event does not exist,
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn update_event(&self, id: EventId, patch: EventPatch) -> Result<Event> {
        let fields = patch.field_names();
        let capacity_changed = patch.total_slots.is_some();

        let event = self
            .store
            .update_event(id, patch)
            .await
            .map_err(transient)?
            .ok_or(BookingError::EventNotFound)?;

        if capacity_changed {
            // Re-seed so the counter reflects the clamped durable value.
            if let Err(e) = self
                .counters
                .overwrite(id, i64::from(event.available_slots))
                .await
            {
                debug!(event_id = %id, error = %e, "could not reset slot counter");
            }
        }
        self.cache_event(&event).await;
        self.invalidate_list_models().await;

        self.broadcaster
            .broadcast_all(ChangeEvent::EventUpdated {
                event_id: id,
                fields,
            })
            .await;

        info!(event_id = %id, "event updated");
        Ok(event)
    }

    /// Delete an event and every cache entry derived from it.
    ///
    /// # Errors
    ///
    /// [`BookingError::EventNotFound`] when the event does not exist,
    /// [`BookingError::Transient`] on durable-store failure.
    pub async fn delete_event(&self, id: EventId) -> Result<()> {
        let deleted = self.store.delete_event(id).await.map_err(transient)?;
        if !deleted {
            return Err(BookingError::EventNotFound);
        }

        if let Err(e) = self.counters.invalidate(id).await {
            debug!(event_id = %id, error = %e, "could not drop slot counter");
        }
        if let Err(e) = self.snapshots.invalidate(&keys::event_data(id)).await {
            debug!(event_id = %id, error = %e, "could not drop event snapshot");
        }
        self.invalidate_list_models().await;

        info!(event_id = %id, "event deleted");
        Ok(())
    }

    async fn cache_event(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(json) => {
                if let Err(e) = self
                    .snapshots
                    .set(&keys::event_data(event.id), &json, ttl::EVENT_DATA)
                    .await
                {
                    debug!(event_id = %event.id, error = %e, "event snapshot write skipped");
                }
            }
            Err(e) => debug!(event_id = %event.id, error = %e, "event snapshot encode failed"),
        }
    }

    async fn invalidate_list_models(&self) {
        for result in [
            self.snapshots
                .invalidate_family(keys::EVENT_LIST_FAMILY)
                .await,
            self.snapshots.invalidate(keys::ADMIN_STATS).await,
        ] {
            if let Err(e) = result {
                debug!(error = %e, "list snapshot invalidation skipped");
            }
        }
    }
}

fn transient(e: StoreError) -> BookingError {
    BookingError::Transient(e.to_string())
}
