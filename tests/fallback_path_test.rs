//! The durable-store fallback path, exercised with an unreachable counter
//! store.
//!
//! With the cache tier down, the conditional row update is the sole
//! correctness mechanism: its `WHERE available_slots > 0` predicate makes
//! compensation unnecessary, and absence of an updated row means denial.

#![allow(clippy::unwrap_used)]

mod support;

use eventhub::cache::CounterStore;
use eventhub::error::BookingError;
use eventhub::store::EventStore;
use eventhub::types::UserId;
use std::sync::Arc;
use support::TestApp;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fallback_grants_exactly_the_available_capacity() {
    let app = TestApp::with_unreachable_counters();
    let event = app.seed_event("Offline Night", 3).await;

    let mut handles = Vec::new();
    for user in 1..=4 {
        let bookings = Arc::clone(&app.bookings);
        handles.push(tokio::spawn(async move {
            bookings.book(event.id, UserId::new(user)).await
        }));
    }

    let mut granted = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(BookingError::FullyBooked) => denied += 1,
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(denied, 1);

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 0);
}

#[tokio::test]
async fn fallback_denial_is_the_normal_business_outcome() {
    let app = TestApp::with_unreachable_counters();
    let event = app.seed_event("Tiny Room", 1).await;

    app.bookings.book(event.id, UserId::new(1)).await.unwrap();
    assert_eq!(
        app.bookings.book(event.id, UserId::new(2)).await.unwrap_err(),
        BookingError::FullyBooked
    );
}

#[tokio::test]
async fn fallback_cancellation_releases_and_clamps() {
    let app = TestApp::with_unreachable_counters();
    let event = app.seed_event("Clamped", 2).await;
    let user = UserId::new(1);

    app.bookings.book(event.id, user).await.unwrap();
    app.bookings.cancel(event.id, user).await.unwrap();

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 2);

    // A second cancel finds no booking and must not touch the count.
    assert_eq!(
        app.bookings.cancel(event.id, user).await.unwrap_err(),
        BookingError::BookingNotFound
    );
    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 2);
}

#[tokio::test]
async fn duplicate_holder_is_rejected_before_any_fallback_mutation() {
    let app = TestApp::with_unreachable_counters();
    let event = app.seed_event("Twice", 3).await;
    let user = UserId::new(9);

    app.bookings.book(event.id, user).await.unwrap();
    assert_eq!(
        app.bookings.book(event.id, user).await.unwrap_err(),
        BookingError::AlreadyBooked
    );

    // Only the first booking took a slot.
    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 2);
}

#[tokio::test]
async fn recovered_counter_reseeds_from_durable_state() {
    let app = TestApp::with_unreachable_counters();
    let event = app.seed_event("Recovery", 4).await;

    app.bookings.book(event.id, UserId::new(1)).await.unwrap();
    app.bookings.book(event.id, UserId::new(2)).await.unwrap();

    // Redis comes back: the counter is cold and the next booking seeds it
    // from the durable value before decrementing.
    app.counters.set_unreachable(false);
    let receipt = app.bookings.book(event.id, UserId::new(3)).await.unwrap();
    assert_eq!(receipt.remaining_slots, 1);
    assert_eq!(app.counters.get(event.id).await.unwrap(), Some(1));
}
