// src/routes/health.rs
//! Liveness endpoint for the tower insights service.
//!
//! Used by container orchestrators and CI to check that the process is up
//! and answering HTTP. It deliberately touches neither the datastore nor
//! the sensor bridge.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges into the gateway router
/// whatever source type the gateway was built with.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
