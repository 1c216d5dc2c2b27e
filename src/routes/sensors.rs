//! Per-sensor views: full health record, status, chart series.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use super::{ApiError, AppState};
use crate::engine::{SensorHealth, SeriesReport, StatusResult, TimeWindow};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/sensors/{sensor_id}", get(detail))
        .route("/sensors/{sensor_id}/status", get(status))
        .route("/sensors/{sensor_id}/series", get(series))
}

#[derive(Debug, Deserialize)]
struct SeriesQuery {
    /// `15m`, `1h` (default), `6h`, `24h` or `custom(start,end)`.
    window: Option<String>,
}

fn unknown(sensor_id: &str) -> ApiError {
    ApiError::not_found(format!("unknown sensor '{sensor_id}'"))
}

async fn detail(
    State(engine): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<SensorHealth>, ApiError> {
    // ---
    engine
        .get_sensor(&sensor_id)
        .map(Json)
        .ok_or_else(|| unknown(&sensor_id))
}

async fn status(
    State(engine): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Result<Json<StatusResult>, ApiError> {
    // ---
    engine
        .get_status(&sensor_id)
        .map(Json)
        .ok_or_else(|| unknown(&sensor_id))
}

async fn series(
    State(engine): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<SeriesReport>, ApiError> {
    // ---
    let window = match query.window.as_deref() {
        None => TimeWindow::default(),
        Some(token) => token
            .parse::<TimeWindow>()
            .map_err(|err| ApiError::bad_request(err.to_string()))?,
    };
    debug!(%sensor_id, %window, "GET /sensors/:id/series");

    engine
        .get_series(&sensor_id, window)
        .await
        .map(Json)
        .ok_or_else(|| unknown(&sensor_id))
}
