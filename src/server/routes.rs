//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{bookings, events, stats, ws, ApiError};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::net::SocketAddr;

/// Build the complete router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Event catalog
        .route("/events", get(events::list_events))
        .route("/events", post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id", put(events::update_event))
        .route("/events/:id", delete(events::delete_event))
        // Bookings
        .route("/events/:id/book", post(bookings::book))
        .route("/events/:id/book", delete(bookings::cancel))
        .route("/bookings/my", get(bookings::my_bookings))
        // Aggregate statistics
        .route("/admin/stats", get(stats::get_stats))
        .layer(from_fn_with_state(state.clone(), admission));

    Router::new()
        // Probes and the WebSocket endpoint skip the admission limiter.
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/ws", get(ws::websocket))
        .nest("/api", api_routes)
        .with_state(state)
}

/// Gate API traffic on the admission limiter, keyed by client address.
async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    if state.limiter.allow(&key).await {
        next.run(request).await
    } else {
        ApiError::too_many_requests().into_response()
    }
}

/// Client key: peer address when the listener provides it, else the
/// forwarding header, else a shared bucket.
fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map_or_else(|| "unknown".to_string(), |ip| ip.trim().to_string())
}
