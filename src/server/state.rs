//! Shared application state for HTTP handlers.

use crate::booking::BookingService;
use crate::catalog::CatalogService;
use crate::identity::TokenVerifier;
use crate::limiter::AdmissionLimiter;
use crate::queries::EventQueryService;
use crate::realtime::ConnectionRegistry;
use crate::store::EventStore;
use std::sync::Arc;

/// Everything a handler needs, cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    /// Durable store, for reads the services don't cover.
    pub store: Arc<dyn EventStore>,
    /// Reservation controller.
    pub bookings: Arc<BookingService>,
    /// Cached read models.
    pub queries: Arc<EventQueryService>,
    /// Event catalog writes.
    pub catalog: Arc<CatalogService>,
    /// Live WebSocket connections on this process.
    pub registry: Arc<ConnectionRegistry>,
    /// Token → user resolution.
    pub verifier: Arc<dyn TokenVerifier>,
    /// General admission limiter, applied to all API traffic.
    pub limiter: Arc<AdmissionLimiter>,
    /// Stricter limiter for booking attempts.
    pub booking_limiter: Arc<AdmissionLimiter>,
}
