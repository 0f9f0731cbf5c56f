//! Health and readiness endpoints.
//!
//! Kept fast and dependency-free so a struggling backend cannot cascade
//! into failing probes.

use axum::Json;
use serde_json::{json, Value};

/// `GET /health`: process liveness.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /ready`: readiness to serve traffic.
pub async fn readiness_check() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}
