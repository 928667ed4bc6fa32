//! Liveness handler.
//!
//! - GET /health -> `{"status":"ok"}`

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /health`
///
/// Always returns 200 OK. Never touches the object store.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}
