//! `GET /status`: classify the bridge's live sample.

use std::collections::BTreeMap;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::{assess, SensorKey, SensorSource, StatusLevel};

// ---

pub fn router<S: SensorSource>() -> Router<AppState<S>> {
    // ---
    Router::new().route("/status", get(handler::<S>))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    sensors: BTreeMap<SensorKey, StatusLevel>,
    overall: StatusLevel,
    color: &'static str,
    headline: &'static str,
}

async fn handler<S: SensorSource>(State((source, config)): State<AppState<S>>) -> impl IntoResponse {
    // ---
    info!("GET /status");

    let snapshot = match source.live().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to reach sensor bridge: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Failed to reach sensor bridge" })),
            )
                .into_response();
        }
    };

    let status = assess(&snapshot, &config.thresholds);
    info!(
        "Live status {:?} across {} sensors",
        status.overall,
        status.sensors.len()
    );

    let body = StatusResponse {
        color: status.overall.color(),
        headline: status.overall.headline(),
        sensors: status.sensors,
        overall: status.overall,
    };
    (StatusCode::OK, Json(body)).into_response()
}
