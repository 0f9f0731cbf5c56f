//! Event catalog endpoints.

use crate::api::{authenticate, ApiError, ApiResponse};
use crate::server::state::AppState;
use crate::store::{EventPatch, NewEvent};
use crate::types::EventId;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query parameters for the event list.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
    /// Case-insensitive title/location filter.
    pub search: Option<String>,
}

/// `GET /api/events`: one page of the event catalog.
///
/// Carries a content-derived `ETag`; an `If-None-Match` hit returns 304
/// without a body.
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(6).clamp(1, 100);
    let search = params.search.as_deref().filter(|s| !s.trim().is_empty());

    let response = state.queries.list_events(page, limit, search).await?;

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == response.etag);
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, response.etag)]).into_response());
    }

    Ok((
        [(header::ETAG, response.etag)],
        Json(ApiResponse::new(response.page)),
    )
        .into_response())
}

/// `GET /api/events/:id`: one event snapshot with the live slot count.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let event = state.queries.get_event(EventId::new(id)).await?;
    Ok(Json(ApiResponse::new(event)).into_response())
}

/// Body for event creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Display title.
    pub title: String,
    /// Long description.
    #[serde(default)]
    pub description: String,
    /// Venue or location label.
    #[serde(default)]
    pub location: String,
    /// Scheduled date.
    pub date: DateTime<Utc>,
    /// Fixed capacity.
    pub total_slots: i32,
    /// Cover image URL.
    pub image: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `POST /api/events`: create an event.
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state.verifier, &headers).await?;

    if body.title.trim().is_empty() {
        return Err(ApiError::bad_request("Title must not be empty"));
    }
    if body.total_slots < 0 {
        return Err(ApiError::bad_request("totalSlots must not be negative"));
    }

    let event = state
        .catalog
        .create_event(NewEvent {
            title: body.title,
            description: body.description,
            location: body.location,
            date: body.date,
            total_slots: body.total_slots,
            image: body.image,
            tags: body.tags,
            created_by: user,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(event))).into_response())
}

/// Body for event updates; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New location.
    pub location: Option<String>,
    /// New date.
    pub date: Option<DateTime<Utc>>,
    /// New capacity.
    pub total_slots: Option<i32>,
    /// New cover image URL.
    pub image: Option<String>,
    /// Replacement tag list.
    pub tags: Option<Vec<String>>,
}

/// `PUT /api/events/:id`: patch event metadata.
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<UpdateEventRequest>,
) -> Result<Response, ApiError> {
    authenticate(&state.verifier, &headers).await?;

    if body.total_slots.is_some_and(|slots| slots < 0) {
        return Err(ApiError::bad_request("totalSlots must not be negative"));
    }

    let patch = EventPatch {
        title: body.title,
        description: body.description,
        location: body.location,
        date: body.date,
        total_slots: body.total_slots,
        image: body.image,
        tags: body.tags,
    };
    if patch.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let event = state.catalog.update_event(EventId::new(id), patch).await?;
    Ok(Json(ApiResponse::new(event)).into_response())
}

/// `DELETE /api/events/:id`: remove an event and its bookings.
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(&state.verifier, &headers).await?;
    state.catalog.delete_event(EventId::new(id)).await?;
    Ok(Json(ApiResponse::with_message((), "Event deleted successfully")).into_response())
}
