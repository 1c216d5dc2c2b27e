//! Dashboard rollups: KPIs, farm and device groups, anomalies.
//!
//! Every route accepts the same optional filter as query parameters:
//! `farm_id`, `device_id`, `type` and `status`.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::debug;

use super::AppState;
use crate::engine::{AnomalyRecord, DeviceGroup, FarmGroup, KpiReport, SensorFilter};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/dashboard/kpis", get(kpis))
        .route("/dashboard/farms", get(farms))
        .route("/dashboard/devices", get(devices))
        .route("/dashboard/anomalies", get(anomalies))
}

async fn kpis(
    State(engine): State<AppState>,
    Query(filter): Query<SensorFilter>,
) -> Json<KpiReport> {
    debug!(?filter, "GET /dashboard/kpis");
    Json(engine.get_kpi_snapshot(&filter))
}

async fn farms(
    State(engine): State<AppState>,
    Query(filter): Query<SensorFilter>,
) -> Json<Vec<FarmGroup>> {
    debug!(?filter, "GET /dashboard/farms");
    Json(engine.get_farm_groups(&filter))
}

async fn devices(
    State(engine): State<AppState>,
    Query(filter): Query<SensorFilter>,
) -> Json<Vec<DeviceGroup>> {
    debug!(?filter, "GET /dashboard/devices");
    Json(engine.get_device_groups(&filter))
}

async fn anomalies(
    State(engine): State<AppState>,
    Query(filter): Query<SensorFilter>,
) -> Json<Vec<AnomalyRecord>> {
    debug!(?filter, "GET /dashboard/anomalies");
    Json(engine.get_anomalies(&filter))
}
