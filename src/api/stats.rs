//! Aggregate statistics endpoint.

use crate::api::{authenticate, ApiError, ApiResponse};
use crate::server::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// `GET /api/admin/stats`: aggregate statistics snapshot.
pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(&state.verifier, &headers).await?;
    let stats = state.queries.get_stats().await?;
    Ok(Json(ApiResponse::new(stats)).into_response())
}
