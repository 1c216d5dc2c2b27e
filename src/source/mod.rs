//! Persistence/query collaborator boundary.
//!
//! The engine never talks to storage directly; it goes through a
//! [`DataSource`]. Fetches are the only suspension points in a refresh
//! cycle and the only operations allowed to fail.
//!
//! Gateway module (EMBP): adapters live in sibling files and are re-exported
//! here so callers only depend on `crate::source`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::models::{RawThresholds, Reading, Sensor};

mod http;
mod postgres;

pub use http::HttpSource;
pub use postgres::PgSource;

// ---

#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    // ---
    /// Sensors of one farm, or of every farm when `farm_id` is `None`.
    async fn fetch_sensors(&self, farm_id: Option<&str>) -> Result<Vec<Sensor>, FetchError>;

    /// Raw threshold fields for one sensor. A sensor without any stored
    /// thresholds yields an empty [`RawThresholds`], not an error.
    async fn fetch_thresholds(&self, sensor_id: &str) -> Result<RawThresholds, FetchError>;

    /// Readings for `sensor_ids` with `since <= timestamp <= until`,
    /// ascending. When more than `limit` match, the newest `limit` are kept.
    async fn fetch_readings(
        &self,
        sensor_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Reading>, FetchError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Sort ascending and keep the newest `limit` readings.
pub(crate) fn newest_ascending(mut readings: Vec<Reading>, limit: u32) -> Vec<Reading> {
    // ---
    readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let limit = limit as usize;
    if readings.len() > limit {
        readings.drain(..readings.len() - limit);
    }
    readings
}
