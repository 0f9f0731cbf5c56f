//! Durable store for events and bookings.
//!
//! The authoritative rows live here; the cache tier holds disposable
//! projections of them. When the counter store is unreachable the
//! conditional slot operations are the sole correctness mechanism, so every
//! implementation must make them atomic at the row level.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use crate::types::{AdminStats, Booking, Event, EventId, EventPage, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable-store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The (user, event) pair already has a booking. Maps to the uniqueness
    /// invariant on the bookings table.
    #[error("duplicate booking")]
    DuplicateBooking,

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Fields for creating an event. `available_slots` starts at `total_slots`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Display title.
    pub title: String,
    /// Long description.
    pub description: String,
    /// Venue or location label.
    pub location: String,
    /// Scheduled date.
    pub date: DateTime<Utc>,
    /// Fixed capacity.
    pub total_slots: i32,
    /// Cover image URL.
    pub image: Option<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Creating user.
    pub created_by: UserId,
}

/// Partial update of event metadata. `None` fields are left unchanged.
/// Shrinking `total_slots` clamps `available_slots` down with it.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New location.
    pub location: Option<String>,
    /// New date.
    pub date: Option<DateTime<Utc>>,
    /// New capacity.
    pub total_slots: Option<i32>,
    /// New cover image URL.
    pub image: Option<String>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
}

impl EventPatch {
    /// Names of the fields this patch touches, for change notifications.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title".to_string());
        }
        if self.description.is_some() {
            fields.push("description".to_string());
        }
        if self.location.is_some() {
            fields.push("location".to_string());
        }
        if self.date.is_some() {
            fields.push("date".to_string());
        }
        if self.total_slots.is_some() {
            fields.push("totalSlots".to_string());
        }
        if self.image.is_some() {
            fields.push("image".to_string());
        }
        if self.tags.is_some() {
            fields.push("tags".to_string());
        }
        fields
    }

    /// `true` when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.date.is_none()
            && self.total_slots.is_none()
            && self.image.is_none()
            && self.tags.is_none()
    }
}

/// Durable event and booking persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch one event.
    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// Fetch one page of events, newest date first, optionally filtered by a
    /// case-insensitive title search or an exact tag match.
    async fn list_events(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> StoreResult<EventPage>;

    /// Insert an event.
    async fn create_event(&self, new: NewEvent) -> StoreResult<Event>;

    /// Apply a metadata patch. Returns `None` if the event does not exist.
    async fn update_event(&self, id: EventId, patch: EventPatch) -> StoreResult<Option<Event>>;

    /// Delete an event and its bookings. Returns whether a row was removed.
    async fn delete_event(&self, id: EventId) -> StoreResult<bool>;

    /// Write the remaining-slot count, clamped into `0..=total_slots`.
    /// Returns whether the event exists.
    async fn set_available_slots(&self, id: EventId, slots: i32) -> StoreResult<bool>;

    /// Fallback reservation: decrement `available_slots` only if positive,
    /// in a single atomic row update. Returns the new count, or `None` when
    /// no slot was available (or the event does not exist).
    async fn reserve_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>>;

    /// Fallback release: increment `available_slots`, capped at
    /// `total_slots`, in a single atomic row update. Returns the new count,
    /// or `None` when the event does not exist.
    async fn release_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>>;

    /// Insert a booking. Fails with [`StoreError::DuplicateBooking`] when
    /// the (user, event) pair already holds one.
    async fn create_booking(&self, event_id: EventId, user_id: UserId) -> StoreResult<Booking>;

    /// Fetch a user's booking for an event.
    async fn get_booking(&self, user_id: UserId, event_id: EventId)
        -> StoreResult<Option<Booking>>;

    /// Delete a user's booking for an event. Returns whether a row was
    /// removed.
    async fn delete_booking(&self, user_id: UserId, event_id: EventId) -> StoreResult<bool>;

    /// A user's bookings joined with their events, newest event first.
    async fn list_user_bookings(&self, user_id: UserId)
        -> StoreResult<Vec<(Booking, Event)>>;

    /// Number of confirmed bookings held by a user.
    async fn count_user_bookings(&self, user_id: UserId) -> StoreResult<i64>;

    /// Aggregate statistics across all events and bookings.
    async fn admin_stats(&self) -> StoreResult<AdminStats>;
}
