//! Shared fixtures for integration tests.
//!
//! Everything runs against the in-memory backends, which honor the same
//! atomicity contracts as the Redis/Postgres implementations.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use eventhub::booking::BookingService;
use eventhub::cache::{CounterStore, MemoryCounters, MemorySnapshots, SnapshotCache};
use eventhub::catalog::CatalogService;
use eventhub::queries::EventQueryService;
use eventhub::realtime::{Broadcaster, ConnectionRegistry, FanoutBus, LocalFanout};
use eventhub::store::{EventStore, MemoryEventStore, NewEvent};
use eventhub::types::{Event, UserId};
use std::sync::Arc;

/// A fully wired single-process application over in-memory backends.
pub struct TestApp {
    pub store: Arc<MemoryEventStore>,
    pub counters: Arc<MemoryCounters>,
    pub snapshots: Arc<MemorySnapshots>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub bookings: Arc<BookingService>,
    pub queries: Arc<EventQueryService>,
    pub catalog: Arc<CatalogService>,
}

impl TestApp {
    /// App with a reachable counter store and no cross-process bus.
    pub fn new() -> Self {
        Self::build(MemoryCounters::new(), None)
    }

    /// App whose counter store fails every call, forcing the durable-store
    /// fallback path.
    pub fn with_unreachable_counters() -> Self {
        Self::build(MemoryCounters::unreachable(), None)
    }

    /// App attached to a shared fan-out bus, simulating one process of a
    /// multi-process deployment.
    pub fn with_bus(bus: Arc<LocalFanout>) -> Self {
        Self::build(MemoryCounters::new(), Some(bus as Arc<dyn FanoutBus>))
    }

    fn build(counters: MemoryCounters, bus: Option<Arc<dyn FanoutBus>>) -> Self {
        let store = Arc::new(MemoryEventStore::new());
        let counters = Arc::new(counters);
        let snapshots = Arc::new(MemorySnapshots::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), bus);

        let store_dyn = Arc::clone(&store) as Arc<dyn EventStore>;
        let counters_dyn = Arc::clone(&counters) as Arc<dyn CounterStore>;
        let snapshots_dyn = Arc::clone(&snapshots) as Arc<dyn SnapshotCache>;

        let bookings = Arc::new(BookingService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&counters_dyn),
            Arc::clone(&snapshots_dyn),
            Arc::clone(&broadcaster),
        ));
        let queries = Arc::new(EventQueryService::new(
            Arc::clone(&store_dyn),
            Arc::clone(&counters_dyn),
            Arc::clone(&snapshots_dyn),
        ));
        let catalog = Arc::new(CatalogService::new(
            store_dyn,
            counters_dyn,
            snapshots_dyn,
            Arc::clone(&broadcaster),
        ));

        Self {
            store,
            counters,
            snapshots,
            registry,
            broadcaster,
            bookings,
            queries,
            catalog,
        }
    }

    /// Insert an event directly into the durable store.
    pub async fn seed_event(&self, title: &str, total_slots: i32) -> Event {
        self.store
            .create_event(NewEvent {
                title: title.to_string(),
                description: format!("{title} description"),
                location: "Main Hall".to_string(),
                date: Utc::now() + Duration::days(14),
                total_slots,
                image: None,
                tags: vec!["live".to_string()],
                created_by: UserId::new(1),
            })
            .await
            .unwrap()
    }
}
