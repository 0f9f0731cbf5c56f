//! HTTP/WebSocket API handlers.
//!
//! Thin plumbing over the booking, catalog and query services. Request
//! validation is minimal and authentication is delegated to the
//! [`TokenVerifier`] seam: token issuance lives in the auth service.

pub mod bookings;
pub mod events;
pub mod stats;
pub mod ws;

use crate::error::BookingError;
use crate::identity::TokenVerifier;
use crate::types::UserId;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Standard success envelope: `{"success": true, "data": ..., "message"?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Always `true` on this path.
    pub success: bool,
    /// Response payload.
    pub data: T,
    /// Optional human-readable note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a payload.
    pub const fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    /// Wrap a payload with a note.
    pub fn with_message(data: T, message: &str) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.to_string()),
        }
    }
}

/// Error envelope: `{"success": false, "message": ...}` with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Missing or invalid credentials.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Authentication required".to_string(),
        }
    }

    /// Request rejected by the admission limiter.
    #[must_use]
    pub fn too_many_requests() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Too many requests, please try again later".to_string(),
        }
    }

    /// Malformed request body or parameters.
    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        let status = match e {
            BookingError::EventNotFound | BookingError::BookingNotFound => StatusCode::NOT_FOUND,
            // Business outcomes, not failures; conflict carries the message.
            BookingError::AlreadyBooked | BookingError::FullyBooked => StatusCode::CONFLICT,
            BookingError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Resolve the `Authorization: Bearer <token>` header to a user id.
///
/// # Errors
///
/// [`ApiError::unauthorized`] when the header is missing, malformed or the
/// token does not verify.
pub async fn authenticate(
    verifier: &Arc<dyn TokenVerifier>,
    headers: &HeaderMap,
) -> Result<UserId, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;

    verifier
        .verify(token)
        .await
        .ok_or_else(ApiError::unauthorized)
}
