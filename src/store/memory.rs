//! In-memory durable store.
//!
//! Backs tests and local development runs. All state lives behind one async
//! mutex, so the conditional slot operations get the same single-writer
//! atomicity the Postgres statements get from row-level locking.

use crate::store::{EventPatch, EventStore, NewEvent, StoreError, StoreResult};
use crate::types::{
    AdminStats, Booking, BookingId, BookingStatus, Event, EventId, EventPage, EventSummary, UserId,
};
use crate::store::postgres::occupancy_rate;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    events: HashMap<EventId, Event>,
    bookings: HashMap<(UserId, EventId), Booking>,
    next_event_id: i64,
    next_booking_id: i64,
}

impl Inner {
    fn booking_count(&self, event_id: EventId) -> i64 {
        self.bookings
            .keys()
            .filter(|(_, eid)| *eid == event_id)
            .count() as i64
    }
}

/// Event store held entirely in process memory.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

impl MemoryEventStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.inner.lock().await.events.get(&id).cloned())
    }

    async fn list_events(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> StoreResult<EventPage> {
        let inner = self.inner.lock().await;
        let needle = search.map(str::to_lowercase);

        let mut matched: Vec<&Event> = inner
            .events
            .values()
            .filter(|event| match (search, &needle) {
                (Some(s), Some(n)) => {
                    event.title.to_lowercase().contains(n)
                        || event.tags.iter().any(|tag| tag == s)
                }
                _ => true,
            })
            .collect();
        matched.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));

        let total = matched.len() as i64;
        let limit_n = limit.max(1) as usize;
        let offset = (page.max(1) as usize - 1) * limit_n;

        let events = matched
            .into_iter()
            .skip(offset)
            .take(limit_n)
            .map(|event| EventSummary {
                event: event.clone(),
                booking_count: inner.booking_count(event.id),
            })
            .collect();

        Ok(EventPage { events, total })
    }

    async fn create_event(&self, new: NewEvent) -> StoreResult<Event> {
        let mut inner = self.inner.lock().await;
        inner.next_event_id += 1;
        let now = Utc::now();
        let event = Event {
            id: EventId::new(inner.next_event_id),
            title: new.title,
            description: new.description,
            location: new.location,
            date: new.date,
            total_slots: new.total_slots,
            available_slots: new.total_slots,
            image: new.image,
            tags: new.tags,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        inner.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn update_event(&self, id: EventId, patch: EventPatch) -> StoreResult<Option<Event>> {
        let mut inner = self.inner.lock().await;
        let Some(event) = inner.events.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = patch.title {
            event.title = title;
        }
        if let Some(description) = patch.description {
            event.description = description;
        }
        if let Some(location) = patch.location {
            event.location = location;
        }
        if let Some(date) = patch.date {
            event.date = date;
        }
        if let Some(total_slots) = patch.total_slots {
            event.total_slots = total_slots;
            event.available_slots = event.available_slots.min(total_slots);
        }
        if let Some(image) = patch.image {
            event.image = Some(image);
        }
        if let Some(tags) = patch.tags {
            event.tags = tags;
        }
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let removed = inner.events.remove(&id).is_some();
        if removed {
            inner.bookings.retain(|(_, eid), _| *eid != id);
        }
        Ok(removed)
    }

    async fn set_available_slots(&self, id: EventId, slots: i32) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(event) = inner.events.get_mut(&id) else {
            return Ok(false);
        };
        event.available_slots = slots.clamp(0, event.total_slots);
        event.updated_at = Utc::now();
        Ok(true)
    }

    async fn reserve_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>> {
        let mut inner = self.inner.lock().await;
        let Some(event) = inner.events.get_mut(&id) else {
            return Ok(None);
        };
        if event.available_slots <= 0 {
            return Ok(None);
        }
        event.available_slots -= 1;
        event.updated_at = Utc::now();
        Ok(Some(event.available_slots))
    }

    async fn release_slot_conditional(&self, id: EventId) -> StoreResult<Option<i32>> {
        let mut inner = self.inner.lock().await;
        let Some(event) = inner.events.get_mut(&id) else {
            return Ok(None);
        };
        event.available_slots = (event.available_slots + 1).min(event.total_slots);
        event.updated_at = Utc::now();
        Ok(Some(event.available_slots))
    }

    async fn create_booking(&self, event_id: EventId, user_id: UserId) -> StoreResult<Booking> {
        let mut inner = self.inner.lock().await;
        if inner.bookings.contains_key(&(user_id, event_id)) {
            return Err(StoreError::DuplicateBooking);
        }
        inner.next_booking_id += 1;
        let booking = Booking {
            id: BookingId::new(inner.next_booking_id),
            event_id,
            user_id,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };
        inner.bookings.insert((user_id, event_id), booking.clone());
        Ok(booking)
    }

    async fn get_booking(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreResult<Option<Booking>> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .get(&(user_id, event_id))
            .cloned())
    }

    async fn delete_booking(&self, user_id: UserId, event_id: EventId) -> StoreResult<bool> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .remove(&(user_id, event_id))
            .is_some())
    }

    async fn list_user_bookings(&self, user_id: UserId) -> StoreResult<Vec<(Booking, Event)>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<(Booking, Event)> = inner
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .filter_map(|booking| {
                inner
                    .events
                    .get(&booking.event_id)
                    .map(|event| (booking.clone(), event.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.1.date.cmp(&a.1.date));
        Ok(rows)
    }

    async fn count_user_bookings(&self, user_id: UserId) -> StoreResult<i64> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .count() as i64)
    }

    async fn admin_stats(&self) -> StoreResult<AdminStats> {
        let inner = self.inner.lock().await;
        let start_of_month = Utc::now()
            .date_naive()
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc());

        let this_month = inner
            .bookings
            .values()
            .filter(|booking| start_of_month.is_none_or(|start| booking.created_at >= start))
            .count() as i64;

        let total_slots: i64 = inner.events.values().map(|e| i64::from(e.total_slots)).sum();
        let booked_slots: i64 = inner
            .events
            .values()
            .map(|e| i64::from(e.total_slots - e.available_slots))
            .sum();

        Ok(AdminStats {
            total_events: inner.events.len() as i64,
            total_bookings: inner.bookings.len() as i64,
            this_month,
            occupancy_rate: occupancy_rate(total_slots, booked_slots),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;

    fn sample_event(total_slots: i32) -> NewEvent {
        NewEvent {
            title: "Rust Meetup".to_string(),
            description: "Monthly meetup".to_string(),
            location: "Main Hall".to_string(),
            date: Utc::now() + Duration::days(7),
            total_slots,
            image: None,
            tags: vec!["rust".to_string()],
            created_by: UserId::new(1),
        }
    }

    #[tokio::test]
    async fn conditional_reserve_stops_at_zero() {
        let store = MemoryEventStore::new();
        let event = store.create_event(sample_event(2)).await.unwrap();

        assert_eq!(
            store.reserve_slot_conditional(event.id).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.reserve_slot_conditional(event.id).await.unwrap(),
            Some(0)
        );
        assert_eq!(store.reserve_slot_conditional(event.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn conditional_release_is_capped_at_capacity() {
        let store = MemoryEventStore::new();
        let event = store.create_event(sample_event(2)).await.unwrap();

        assert_eq!(
            store.release_slot_conditional(event.id).await.unwrap(),
            Some(2)
        );
        assert_eq!(
            store.release_slot_conditional(event.id).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn duplicate_booking_is_rejected() {
        let store = MemoryEventStore::new();
        let event = store.create_event(sample_event(5)).await.unwrap();
        let user = UserId::new(9);

        store.create_booking(event.id, user).await.unwrap();
        assert!(matches!(
            store.create_booking(event.id, user).await,
            Err(StoreError::DuplicateBooking)
        ));
    }

    #[tokio::test]
    async fn shrinking_capacity_clamps_available() {
        let store = MemoryEventStore::new();
        let event = store.create_event(sample_event(10)).await.unwrap();

        let patch = EventPatch {
            total_slots: Some(4),
            ..EventPatch::default()
        };
        let updated = store.update_event(event.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.total_slots, 4);
        assert_eq!(updated.available_slots, 4);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = MemoryEventStore::new();
        for i in 0..8 {
            let mut new = sample_event(5);
            new.title = format!("Event {i}");
            if i % 2 == 0 {
                new.tags = vec!["workshop".to_string()];
            }
            store.create_event(new).await.unwrap();
        }

        let page = store.list_events(1, 3, None).await.unwrap();
        assert_eq!(page.events.len(), 3);
        assert_eq!(page.total, 8);

        // Title search is a case-insensitive substring; tag search is exact.
        let by_title = store.list_events(1, 10, Some("event 3")).await.unwrap();
        assert_eq!(by_title.total, 1);
        let by_tag = store.list_events(1, 10, Some("workshop")).await.unwrap();
        assert_eq!(by_tag.total, 4);
    }
}
