//! Reservation controller.
//!
//! Orchestrates check → reserve → commit for one slot of an event,
//! coordinating the counter store, the durable store, the snapshot cache and
//! the broadcaster. Oversell prevention rests entirely on the counter
//! store's atomic decrement; when that tier is unreachable the controller
//! drops to a conditional durable-store update whose `WHERE` predicate makes
//! it inherently safe.
//!
//! Every counter mutation constructs its compensating action at the same
//! site (see [`Compensation`]), so a failed commit always knows how to undo
//! the reservation it took.

use crate::cache::{keys, CacheResult, CounterStore, SnapshotCache};
use crate::error::{BookingError, Result};
use crate::realtime::Broadcaster;
use crate::store::{EventStore, StoreError};
use crate::types::{Booking, ChangeEvent, Event, EventId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A granted reservation together with the remaining capacity observed at
/// grant time.
#[derive(Clone, Debug, PartialEq)]
pub struct BookingReceipt {
    /// The persisted booking row.
    pub booking: Booking,
    /// Remaining slots immediately after this grant.
    pub remaining_slots: i32,
}

/// How a grant was obtained, for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GrantPath {
    Counter,
    Fallback,
}

/// The undo of a counter decrement, paired with the mutation at construction
/// time. Runs the increment with one retry; a second failure is logged and
/// left to the counter TTL to heal.
struct Compensation {
    counters: Arc<dyn CounterStore>,
    event_id: EventId,
}

impl Compensation {
    const fn for_decrement(counters: Arc<dyn CounterStore>, event_id: EventId) -> Self {
        Self { counters, event_id }
    }

    async fn run(self) {
        for attempt in 0..2u8 {
            match self.counters.increment(self.event_id).await {
                Ok(_) => return,
                Err(e) if attempt == 0 => {
                    debug!(event_id = %self.event_id, error = %e, "retrying slot compensation");
                }
                Err(e) => {
                    warn!(
                        event_id = %self.event_id,
                        error = %e,
                        "slot compensation failed; counter heals on TTL expiry"
                    );
                }
            }
        }
    }
}

/// Outcome of the counter-store reservation attempt.
enum CounterOutcome {
    Granted { remaining: i64 },
    Exhausted,
}

/// The slot-reservation concurrency controller.
pub struct BookingService {
    store: Arc<dyn EventStore>,
    counters: Arc<dyn CounterStore>,
    snapshots: Arc<dyn SnapshotCache>,
    broadcaster: Arc<Broadcaster>,
}

impl BookingService {
    /// Wire the controller to its collaborators.
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

    /// Reserve one slot of `event_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::EventNotFound`]: no such event (checked before any
    ///   mutation).
    /// - [`BookingError::AlreadyBooked`]: the user already holds a booking.
    /// - [`BookingError::FullyBooked`]: capacity exhausted, on either path.
    /// - [`BookingError::Transient`]: a durable-store failure after the
    ///   slot was taken; the slot has been compensated and the whole call is
    ///   safe to retry.
    pub async fn book(&self, event_id: EventId, user_id: UserId) -> Result<BookingReceipt> {
        let event = self
            .store
            .get_event(event_id)
            .await
            .map_err(transient)?
            .ok_or(BookingError::EventNotFound)?;

        if self
            .store
            .get_booking(user_id, event_id)
            .await
            .map_err(transient)?
            .is_some()
        {
            return Err(BookingError::AlreadyBooked);
        }

        match self.reserve_via_counter(&event).await {
            Ok(CounterOutcome::Granted { remaining }) => {
                let receipt = self
                    .commit_counter_grant(&event, user_id, remaining)
                    .await?;
                self.finish_booking(&receipt, GrantPath::Counter).await;
                Ok(receipt)
            }
            Ok(CounterOutcome::Exhausted) => Err(BookingError::FullyBooked),
            Err(e) => {
                // Counter tier unreachable: degrade to the conditional
                // durable-store path. Invisible to the caller.
                debug!(event_id = %event_id, error = %e, "counter store unavailable, using fallback path");
                let receipt = self.book_via_fallback(event_id, user_id).await?;
                self.finish_booking(&receipt, GrantPath::Fallback).await;
                Ok(receipt)
            }
        }
    }

    /// Cancel `user_id`'s booking on `event_id`, releasing its slot.
    ///
    /// The release is clamped at `total_slots` on both tiers, so a duplicate
    /// cancel can never inflate capacity.
    ///
    /// # Errors
    ///
    /// - [`BookingError::EventNotFound`]: no such event.
    /// - [`BookingError::BookingNotFound`]: the user holds no booking.
    /// - [`BookingError::Transient`]: durable-store failure; retryable.
    pub async fn cancel(&self, event_id: EventId, user_id: UserId) -> Result<()> {
        let event = self
            .store
            .get_event(event_id)
            .await
            .map_err(transient)?
            .ok_or(BookingError::EventNotFound)?;

        let deleted = self
            .store
            .delete_booking(user_id, event_id)
            .await
            .map_err(transient)?;
        if !deleted {
            return Err(BookingError::BookingNotFound);
        }

        let available_slots = match self.release_via_counter(&event).await {
            Ok(slots) => {
                if let Err(e) = self.store.set_available_slots(event_id, slots).await {
                    warn!(event_id = %event_id, error = %e, "failed to write released slot count");
                }
                slots
            }
            Err(e) => {
                debug!(event_id = %event_id, error = %e, "counter store unavailable, releasing via fallback");
                self.store
                    .release_slot_conditional(event_id)
                    .await
                    .map_err(transient)?
                    .unwrap_or(event.available_slots)
            }
        };

        self.invalidate_read_models(event_id).await;

        self.broadcaster
            .broadcast_all(ChangeEvent::SlotUpdate {
                event_id,
                available_slots,
            })
            .await;
        self.broadcaster
            .broadcast_all(ChangeEvent::BookingCancelled { event_id, user_id })
            .await;
        self.notify_booking_count(user_id).await;

        info!(event_id = %event_id, user_id = %user_id, available_slots, "booking cancelled");
        Ok(())
    }

    /// Steps 1–4 of the reservation algorithm against the counter store.
    async fn reserve_via_counter(&self, event: &Event) -> CacheResult<CounterOutcome> {
        let current = match self.counters.get(event.id).await? {
            Some(value) => value,
            None => {
                // First-reader-populates; a losing seed leaves the existing
                // value alone and the decrement below stays authoritative.
                let seeded = i64::from(event.available_slots);
                self.counters.seed(event.id, seeded).await?;
                seeded
            }
        };

        if current <= 0 {
            return Ok(CounterOutcome::Exhausted);
        }

        let remaining = self.counters.decrement(event.id).await?;
        if remaining < 0 {
            // A racing caller took the last slot between the read and the
            // decrement; put the unit back before anyone can observe it.
            Compensation::for_decrement(Arc::clone(&self.counters), event.id)
                .run()
                .await;
            return Ok(CounterOutcome::Exhausted);
        }

        Ok(CounterOutcome::Granted { remaining })
    }

    /// Step 5: persist the booking row and the decremented count, undoing
    /// the counter decrement on any failure.
    async fn commit_counter_grant(
        &self,
        event: &Event,
        user_id: UserId,
        remaining: i64,
    ) -> Result<BookingReceipt> {
        let compensation = Compensation::for_decrement(Arc::clone(&self.counters), event.id);

        let booking = match self.store.create_booking(event.id, user_id).await {
            Ok(booking) => booking,
            Err(StoreError::DuplicateBooking) => {
                compensation.run().await;
                return Err(BookingError::AlreadyBooked);
            }
            Err(e) => {
                compensation.run().await;
                return Err(transient(e));
            }
        };

        #[allow(clippy::cast_possible_truncation)] // counter mirrors an i32 column
        let remaining_slots = remaining as i32;
        if let Err(e) = self
            .store
            .set_available_slots(event.id, remaining_slots)
            .await
        {
            // The booking row is committed and the counter is authoritative
            // while warm; the durable count catches up on the next write.
            warn!(event_id = %event.id, error = %e, "failed to write decremented slot count");
        }

        Ok(BookingReceipt {
            booking,
            remaining_slots,
        })
    }

    /// Fallback reservation: the durable store's conditional decrement is
    /// the sole correctness mechanism.
    async fn book_via_fallback(&self, event_id: EventId, user_id: UserId) -> Result<BookingReceipt> {
        let remaining_slots = self
            .store
            .reserve_slot_conditional(event_id)
            .await
            .map_err(transient)?
            .ok_or(BookingError::FullyBooked)?;

        // A warm-but-unreachable counter would be stale after this; drop the
        // key so the next reader reseeds from the durable value.
        if let Err(e) = self.counters.invalidate(event_id).await {
            debug!(event_id = %event_id, error = %e, "could not drop stale counter");
        }

        let booking = match self.store.create_booking(event_id, user_id).await {
            Ok(booking) => booking,
            Err(e) => {
                // Undo the conditional decrement; the clamped increment is
                // safe to repeat.
                if let Err(release_err) = self.store.release_slot_conditional(event_id).await {
                    warn!(event_id = %event_id, error = %release_err, "failed to release fallback slot");
                }
                return Err(match e {
                    StoreError::DuplicateBooking => BookingError::AlreadyBooked,
                    other => transient(other),
                });
            }
        };

        Ok(BookingReceipt {
            booking,
            remaining_slots,
        })
    }

    /// Mirror of the reserve path: seed if cold, increment, clamp at
    /// capacity.
    async fn release_via_counter(&self, event: &Event) -> CacheResult<i32> {
        if self.counters.get(event.id).await?.is_none() {
            self.counters
                .seed(event.id, i64::from(event.available_slots))
                .await?;
        }

        let total = i64::from(event.total_slots);
        let value = self.counters.increment(event.id).await?;
        let clamped = if value > total {
            self.counters.overwrite(event.id, total).await?;
            total
        } else {
            value
        };

        #[allow(clippy::cast_possible_truncation)] // clamped into i32 range
        let clamped = clamped as i32;
        Ok(clamped)
    }

    /// Step 6: drop every read model affected by a slot change and announce
    /// it. Cache failures here are logged and absorbed: the TTLs are the
    /// safety net.
    async fn finish_booking(&self, receipt: &BookingReceipt, path: GrantPath) {
        let event_id = receipt.booking.event_id;
        let user_id = receipt.booking.user_id;

        self.invalidate_read_models(event_id).await;

        self.broadcaster
            .broadcast_all(ChangeEvent::SlotUpdate {
                event_id,
                available_slots: receipt.remaining_slots,
            })
            .await;
        self.broadcaster
            .broadcast_all(ChangeEvent::BookingCreated {
                event_id,
                user_id,
                booking_id: receipt.booking.id,
            })
            .await;
        self.notify_booking_count(user_id).await;

        info!(
            event_id = %event_id,
            user_id = %user_id,
            remaining_slots = receipt.remaining_slots,
            fallback = matches!(path, GrantPath::Fallback),
            "booking confirmed"
        );
    }

    async fn invalidate_read_models(&self, event_id: EventId) {
        for result in [
            self.snapshots.invalidate(&keys::event_data(event_id)).await,
            self.snapshots
                .invalidate_family(keys::EVENT_LIST_FAMILY)
                .await,
            self.snapshots.invalidate(keys::ADMIN_STATS).await,
        ] {
            if let Err(e) = result {
                debug!(event_id = %event_id, error = %e, "snapshot invalidation skipped");
            }
        }
    }

    async fn notify_booking_count(&self, user_id: UserId) {
        match self.store.count_user_bookings(user_id).await {
            Ok(count) => {
                self.broadcaster
                    .broadcast_to_user(user_id, ChangeEvent::BookingCount { user_id, count })
                    .await;
            }
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "skipping booking count notification");
            }
        }
    }
}

fn transient(e: StoreError) -> BookingError {
    BookingError::Transient(e.to_string())
}
