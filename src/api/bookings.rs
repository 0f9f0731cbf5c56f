//! Booking endpoints.

use crate::api::{authenticate, ApiError, ApiResponse};
use crate::server::state::AppState;
use crate::types::{Booking, Event, EventId};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A booking joined with its event, for the "my bookings" view.
#[derive(Debug, Serialize)]
pub struct BookingWithEvent {
    /// The booking row.
    #[serde(flatten)]
    pub booking: Booking,
    /// The booked event.
    pub event: Event,
}

/// `POST /api/events/:id/book`: reserve one slot.
pub async fn book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = authenticate(&state.verifier, &headers).await?;

    if !state.booking_limiter.allow(&format!("book:{user}")).await {
        return Err(ApiError::too_many_requests());
    }

    let receipt = state.bookings.book(EventId::new(id), user).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            receipt.booking,
            "Event booked successfully",
        )),
    )
        .into_response())
}

/// `DELETE /api/events/:id/book`: cancel the caller's booking.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = authenticate(&state.verifier, &headers).await?;

    if !state.booking_limiter.allow(&format!("book:{user}")).await {
        return Err(ApiError::too_many_requests());
    }

    state.bookings.cancel(EventId::new(id), user).await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "Booking cancelled successfully",
    ))
    .into_response())
}

/// `GET /api/bookings/my`: the caller's bookings with event details.
pub async fn my_bookings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = authenticate(&state.verifier, &headers).await?;

    let rows = state
        .store
        .list_user_bookings(user)
        .await
        .map_err(|e| crate::error::BookingError::Transient(e.to_string()))?;

    let bookings: Vec<BookingWithEvent> = rows
        .into_iter()
        .map(|(booking, event)| BookingWithEvent { booking, event })
        .collect();

    Ok(Json(ApiResponse::new(bookings)).into_response())
}
