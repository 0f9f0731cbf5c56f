//! Cross-process fan-out properties.
//!
//! Two applications share one fan-out bus, standing in for two server
//! processes bridged by the pub/sub channel. An event handed to
//! `broadcast_to_user(u, e)` on process A must reach every live,
//! identity-bound connection for `u` on every process, and nobody else;
//! every delivery is at most once per connection.

#![allow(clippy::unwrap_used)]

mod support;

use eventhub::realtime::{LocalFanout, Outbound};
use eventhub::types::{ChangeEvent, EventId, UserId};
use std::sync::Arc;
use std::time::Duration;
use support::TestApp;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

const RECV_WAIT: Duration = Duration::from_secs(1);
const QUIET_WAIT: Duration = Duration::from_millis(150);

fn attach_connection(app: &TestApp) -> (eventhub::realtime::ConnectionId, UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = app.registry.register(tx);
    (id, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<Outbound>) -> ChangeEvent {
    loop {
        match timeout(RECV_WAIT, rx.recv()).await.unwrap().unwrap() {
            Outbound::Event(json) => return serde_json::from_str(&json).unwrap(),
            Outbound::Ping => {}
        }
    }
}

async fn assert_quiet(rx: &mut UnboundedReceiver<Outbound>) {
    assert!(
        timeout(QUIET_WAIT, rx.recv()).await.is_err(),
        "connection received an unexpected frame"
    );
}

#[tokio::test]
async fn identity_scoped_events_reach_that_identity_on_every_process() {
    let bus = Arc::new(LocalFanout::default());
    let process_a = TestApp::with_bus(Arc::clone(&bus));
    let process_b = TestApp::with_bus(Arc::clone(&bus));

    let _sub_a = process_a.broadcaster.spawn_subscriber();
    let _sub_b = process_b.broadcaster.spawn_subscriber();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let user = UserId::new(7);
    let (bound_a, mut rx_bound_a) = attach_connection(&process_a);
    let (_anon_a, mut rx_anon_a) = attach_connection(&process_a);
    let (bound_b, mut rx_bound_b) = attach_connection(&process_b);
    let (other_b, mut rx_other_b) = attach_connection(&process_b);

    process_a.registry.bind_user(bound_a, user);
    process_b.registry.bind_user(bound_b, user);
    process_b.registry.bind_user(other_b, UserId::new(8));

    let event = ChangeEvent::BookingCount { user_id: user, count: 2 };
    process_a
        .broadcaster
        .broadcast_to_user(user, event.clone())
        .await;

    assert_eq!(next_event(&mut rx_bound_a).await, event);
    assert_eq!(next_event(&mut rx_bound_b).await, event);

    // Unbound connections and other identities see nothing.
    assert_quiet(&mut rx_anon_a).await;
    assert_quiet(&mut rx_other_b).await;

    // At most once per connection: no duplicate arrives via the channel.
    assert_quiet(&mut rx_bound_a).await;
    assert_quiet(&mut rx_bound_b).await;
}

#[tokio::test]
async fn broadcast_all_reaches_every_connection_exactly_once() {
    let bus = Arc::new(LocalFanout::default());
    let process_a = TestApp::with_bus(Arc::clone(&bus));
    let process_b = TestApp::with_bus(Arc::clone(&bus));

    let _sub_a = process_a.broadcaster.spawn_subscriber();
    let _sub_b = process_b.broadcaster.spawn_subscriber();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (bound_a, mut rx_bound_a) = attach_connection(&process_a);
    let (_anon_a, mut rx_anon_a) = attach_connection(&process_a);
    let (_anon_b, mut rx_anon_b) = attach_connection(&process_b);
    process_a.registry.bind_user(bound_a, UserId::new(1));

    let event = ChangeEvent::SlotUpdate {
        event_id: EventId::new(5),
        available_slots: 9,
    };
    process_a.broadcaster.broadcast_all(event.clone()).await;

    assert_eq!(next_event(&mut rx_bound_a).await, event);
    assert_eq!(next_event(&mut rx_anon_a).await, event);
    assert_eq!(next_event(&mut rx_anon_b).await, event);

    // The publishing process must skip its own envelope when it comes back
    // over the channel.
    assert_quiet(&mut rx_bound_a).await;
    assert_quiet(&mut rx_anon_a).await;
    assert_quiet(&mut rx_anon_b).await;
}

#[tokio::test]
async fn booking_flow_announces_changes_on_sibling_processes() {
    let bus = Arc::new(LocalFanout::default());
    let process_a = TestApp::with_bus(Arc::clone(&bus));
    let process_b = TestApp::with_bus(Arc::clone(&bus));

    let _sub_b = process_b.broadcaster.spawn_subscriber();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_conn_b, mut rx_b) = attach_connection(&process_b);

    let event = process_a.seed_event("Replicated", 3).await;
    process_a
        .bookings
        .book(event.id, UserId::new(1))
        .await
        .unwrap();

    // The sibling sees the slot update followed by the booking notice.
    assert_eq!(
        next_event(&mut rx_b).await,
        ChangeEvent::SlotUpdate {
            event_id: event.id,
            available_slots: 2,
        }
    );
    assert!(matches!(
        next_event(&mut rx_b).await,
        ChangeEvent::BookingCreated { .. }
    ));
}

#[tokio::test]
async fn without_a_bus_delivery_stays_local() {
    let app = TestApp::new();
    let (_conn, mut rx) = attach_connection(&app);

    app.broadcaster
        .broadcast_all(ChangeEvent::SlotUpdate {
            event_id: EventId::new(1),
            available_slots: 4,
        })
        .await;

    assert!(matches!(
        next_event(&mut rx).await,
        ChangeEvent::SlotUpdate { .. }
    ));
    assert_quiet(&mut rx).await;
}
