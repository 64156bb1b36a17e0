//! Liveness endpoint.

use axum::http::StatusCode;

/// Answers `200 OK` while the server accepts connections.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
