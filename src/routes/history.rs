//! `GET /history`: bucketed chart series for one sensor over one window.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use super::AppState;
use crate::{aggregate, localtime, SensorKey, SensorSource, SeriesStatistics, TimeWindow};

// ---

pub fn router<S: SensorSource>() -> Router<AppState<S>> {
    // ---
    Router::new().route("/history", get(handler::<S>))
}

/// Query parameters; both default to the dashboard's initial selection.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    sensor: Option<String>,
    window: Option<String>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    sensor: SensorKey,
    window: TimeWindow,
    labels: Vec<String>,
    values: Vec<f64>,
    sampled: bool,
    statistics: SeriesStatistics,
}

async fn handler<S: SensorSource>(
    Query(params): Query<HistoryQuery>,
    State((source, _config)): State<AppState<S>>,
) -> impl IntoResponse {
    // ---
    info!("GET /history {:?}", params);

    let parsed = params
        .sensor
        .as_deref()
        .unwrap_or("water_temp")
        .parse::<SensorKey>()
        .and_then(|sensor| {
            let window = params.window.as_deref().unwrap_or("day").parse::<TimeWindow>()?;
            Ok((sensor, window))
        });

    let (sensor, window) = match parsed {
        Ok(selection) => selection,
        Err(e) => {
            debug!("Rejecting history query: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let now = localtime::local_now(Utc::now());
    let records = match source.history(window.horizon_start(now)).await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to fetch history: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch history" })),
            )
                .into_response();
        }
    };

    let aggregation = aggregate(&records, sensor, window, now);
    info!(
        "History for {} over {}: {} points from {} valid readings",
        sensor,
        window,
        aggregation.points.len(),
        aggregation.statistics.count
    );

    let body = HistoryResponse {
        sensor,
        window,
        labels: aggregation.labels(),
        values: aggregation.values(),
        sampled: aggregation.sampled,
        statistics: aggregation.statistics,
    };
    (StatusCode::OK, Json(body)).into_response()
}
