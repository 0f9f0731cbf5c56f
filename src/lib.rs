//! EventHub: event booking with cache-accelerated slot reservation and
//! real-time fan-out.
//!
//! Manages finite-capacity events under concurrent demand, keeping a Redis
//! cache tier and a Postgres durable store consistent while broadcasting
//! state changes to WebSocket clients across server processes.
//!
//! # Architecture
//!
//! ```text
//!            ┌────────────────┐
//!   request  │   Admission    │
//!  ─────────▶│    Limiter     │ Redis window, per-process fallback
//!            └───────┬────────┘
//!                    ▼
//!            ┌────────────────┐     ┌──────────────────┐
//!            │  Reservation   │────▶│  Counter Store   │ atomic INCR/DECR
//!            │   Controller   │     │  (authoritative  │
//!            │  (booking)     │     │   while warm)    │
//!            └───┬────────┬───┘     └──────────────────┘
//!                │        │ fallback: conditional row update
//!                ▼        ▼
//!   ┌────────────────┐  ┌──────────────────┐
//!   │ Snapshot Cache │  │  Durable Store   │ authoritative rows
//!   │ (invalidated   │  │   (Postgres)     │
//!   │  on writes)    │  └──────────────────┘
//!   └────────────────┘
//!                │
//!                ▼
//!   ┌────────────────────────────────────┐
//!   │ Fan-out Broadcaster                │ local registry + shared
//!   │ (all / identity-scoped delivery)   │ pub/sub channel
//!   └────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - No oversell: the counter store's atomic decrement (or, in fallback
//!   mode, the durable store's conditional update) is the sole correctness
//!   mechanism: no client-side locking.
//! - Eventual durability: the durable store converges to the counter value;
//!   snapshots may lag by at most one TTL.
//! - At-most-once delivery per connection per change event, with no
//!   ordering guarantee across processes.

pub mod api;
pub mod booking;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod limiter;
pub mod queries;
pub mod realtime;
pub mod server;
pub mod store;
pub mod types;

pub use booking::{BookingReceipt, BookingService};
pub use catalog::CatalogService;
pub use config::Config;
pub use error::BookingError;
pub use queries::EventQueryService;
pub use realtime::Broadcaster;
pub use types::{Booking, ChangeEvent, Event, EventId, UserId};
