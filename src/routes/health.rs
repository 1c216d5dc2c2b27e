// src/routes/health.rs
//! Service health check endpoint.
//!
//! Used by container orchestrators and CI to verify the service answers
//! HTTP. Reports `ok` while the last refresh succeeded and `stale` while the
//! data source is failing; both are HTTP 200, since the service still serves
//! its last good view.
//!
//! Follows EMBP: the handler is private, the gateway merges [`router`].

use axum::extract::State;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::error::StaleDataWarning;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    source: String,
    last_evaluated_at: Option<DateTime<Utc>>,
    live_readings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale: Option<StaleDataWarning>,
}

/// Handle `GET /health`. Never touches the data source.
async fn health(State(engine): State<AppState>) -> Json<HealthResponse> {
    // ---
    let stale = engine.stale();
    Json(HealthResponse {
        status: if stale.is_some() { "stale" } else { "ok" },
        source: engine.source_name().to_string(),
        last_evaluated_at: engine.last_evaluated_at(),
        live_readings: engine.live_readings(),
        stale,
    })
}

/// Subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
