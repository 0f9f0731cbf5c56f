//! Concurrency properties of the reservation controller.
//!
//! For an event with `total_slots = N`, any number of concurrent booking
//! attempts must grant at most N reservations, and the durable slot count
//! must never go negative.

#![allow(clippy::unwrap_used)]

mod support;

use eventhub::cache::CounterStore;
use eventhub::error::BookingError;
use eventhub::store::EventStore;
use eventhub::types::UserId;
use std::sync::Arc;
use support::TestApp;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_slot_goes_to_exactly_one_of_two_racers() {
    let app = TestApp::new();
    let event = app.seed_event("Closing Night", 1).await;

    let first = {
        let bookings = Arc::clone(&app.bookings);
        tokio::spawn(async move { bookings.book(event.id, UserId::new(1)).await })
    };
    let second = {
        let bookings = Arc::clone(&app.bookings);
        tokio::spawn(async move { bookings.book(event.id, UserId::new(2)).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let granted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let denied: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].remaining_slots, 0);
    assert_eq!(denied, vec![&BookingError::FullyBooked]);

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn capacity_is_never_oversold_under_heavy_contention() {
    let app = TestApp::new();
    let event = app.seed_event("Festival", 5).await;

    let mut handles = Vec::new();
    for user in 1..=20 {
        let bookings = Arc::clone(&app.bookings);
        handles.push(tokio::spawn(async move {
            bookings.book(event.id, UserId::new(user)).await
        }));
    }

    let mut granted = Vec::new();
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => granted.push(receipt),
            Err(BookingError::FullyBooked) => denied += 1,
            Err(other) => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(granted.len(), 5);
    assert_eq!(denied, 15);

    // Each grant observed a distinct, strictly decreasing remaining count.
    let mut remaining: Vec<i32> = granted.iter().map(|r| r.remaining_slots).collect();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![0, 1, 2, 3, 4]);

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 0);
    assert_eq!(app.counters.get(event.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn one_active_booking_per_holder_and_event() {
    let app = TestApp::new();
    let event = app.seed_event("Workshop", 10).await;
    let user = UserId::new(3);

    app.bookings.book(event.id, user).await.unwrap();
    assert_eq!(
        app.bookings.book(event.id, user).await.unwrap_err(),
        BookingError::AlreadyBooked
    );

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_restores_capacity_for_new_bookings() {
    let app = TestApp::new();
    let event = app.seed_event("Recital", 1).await;

    app.bookings.book(event.id, UserId::new(1)).await.unwrap();
    assert_eq!(
        app.bookings.book(event.id, UserId::new(2)).await.unwrap_err(),
        BookingError::FullyBooked
    );

    app.bookings.cancel(event.id, UserId::new(1)).await.unwrap();

    let receipt = app.bookings.book(event.id, UserId::new(2)).await.unwrap();
    assert_eq!(receipt.remaining_slots, 0);

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 0);
}

#[tokio::test]
async fn repeated_cancels_never_raise_slots_above_capacity() {
    let app = TestApp::new();
    let event = app.seed_event("Matinee", 2).await;
    let user = UserId::new(4);

    app.bookings.book(event.id, user).await.unwrap();
    app.bookings.cancel(event.id, user).await.unwrap();
    assert_eq!(
        app.bookings.cancel(event.id, user).await.unwrap_err(),
        BookingError::BookingNotFound
    );

    let stored = app.store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.available_slots, 2);
    assert_eq!(app.counters.get(event.id).await.unwrap(), Some(2));
}
