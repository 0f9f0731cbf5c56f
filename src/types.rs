//! Domain types for the event booking system.
//!
//! Events are finite-capacity resources; bookings claim one slot of an
//! event's capacity. Cached copies of either are disposable projections;
//! the durable store owns the authoritative rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Wrap a raw database id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (issued by the identity service).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw user id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(i64);

impl BookingId {
    /// Wrap a raw booking id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A bookable event with a fixed slot capacity.
///
/// `available_slots` is mutable and bounded by `0..=total_slots`;
/// `updated_at` participates in cache-key/ETag derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event id.
    pub id: EventId,
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
    /// Remaining capacity.
    pub available_slots: i32,
    /// Cover image URL.
    pub image: Option<String>,
    /// Free-form tags, also matched by list search.
    pub tags: Vec<String>,
    /// Creating user.
    pub created_by: UserId,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Status of a booking row. Cancelled bookings are deleted, so the only
/// persisted status is `Confirmed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// The booking holds one slot of the event's capacity.
    Confirmed,
}

/// A user's claim on one slot of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking id.
    pub id: BookingId,
    /// Booked event.
    pub event_id: EventId,
    /// Booking user.
    pub user_id: UserId,
    /// Row status.
    pub status: BookingStatus,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Read models
// ============================================================================

/// An event together with its booking count, as returned by list queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    /// The event row.
    #[serde(flatten)]
    pub event: Event,
    /// Number of confirmed bookings.
    pub booking_count: i64,
}

/// One page of the event list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events on this page, newest date first.
    pub events: Vec<EventSummary>,
    /// Total matching events across all pages.
    pub total: i64,
}

/// Aggregate statistics over all events and bookings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    /// Number of events.
    pub total_events: i64,
    /// Number of confirmed bookings.
    pub total_bookings: i64,
    /// Bookings created since the start of the current month.
    pub this_month: i64,
    /// Percentage of capacity currently booked, rounded to whole percent.
    pub occupancy_rate: i64,
}

// ============================================================================
// Change events
// ============================================================================

/// A state-change notification fanned out to connected clients.
///
/// Serialized as `{"type": ..., "payload": ...}`: the discriminated union
/// the browser clients already speak. Transient: transported, never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    /// An event's remaining slot count changed.
    #[serde(rename_all = "camelCase")]
    SlotUpdate {
        /// Affected event.
        event_id: EventId,
        /// New remaining count.
        available_slots: i32,
    },
    /// A booking was created.
    #[serde(rename_all = "camelCase")]
    BookingCreated {
        /// Booked event.
        event_id: EventId,
        /// Booking user.
        user_id: UserId,
        /// New booking id.
        booking_id: BookingId,
    },
    /// A booking was cancelled.
    #[serde(rename_all = "camelCase")]
    BookingCancelled {
        /// Affected event.
        event_id: EventId,
        /// Cancelling user.
        user_id: UserId,
    },
    /// Event metadata changed.
    #[serde(rename_all = "camelCase")]
    EventUpdated {
        /// Affected event.
        event_id: EventId,
        /// Names of the updated fields.
        fields: Vec<String>,
    },
    /// A user's own booking count changed (identity-scoped).
    #[serde(rename_all = "camelCase")]
    BookingCount {
        /// The user the count belongs to.
        user_id: UserId,
        /// Current number of confirmed bookings.
        count: i64,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn change_event_wire_shape() {
        let event = ChangeEvent::SlotUpdate {
            event_id: EventId::new(7),
            available_slots: 3,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SLOT_UPDATE");
        assert_eq!(json["payload"]["eventId"], 7);
        assert_eq!(json["payload"]["availableSlots"], 3);
    }

    #[test]
    fn change_event_round_trips() {
        let event = ChangeEvent::BookingCreated {
            event_id: EventId::new(1),
            user_id: UserId::new(2),
            booking_id: BookingId::new(3),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn booking_count_is_identity_scoped_variant() {
        let event = ChangeEvent::BookingCount {
            user_id: UserId::new(42),
            count: 2,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BOOKING_COUNT");
        assert_eq!(json["payload"]["userId"], 42);
    }
}
