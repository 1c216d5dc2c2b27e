//! PostgreSQL data source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::debug;

use super::DataSource;
use crate::error::FetchError;
use crate::models::{RawThresholds, Reading, Sensor};

// ---

#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    // ---
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataSource for PgSource {
    // ---
    async fn fetch_sensors(&self, farm_id: Option<&str>) -> Result<Vec<Sensor>, FetchError> {
        // ---
        let sensors = sqlx::query_as::<_, Sensor>(
            r#"
            SELECT sensor_id, device_id, farm_id, sensor_type, unit
            FROM sensors
            WHERE ($1::text IS NULL OR farm_id = $1)
            ORDER BY farm_id, device_id, sensor_id
            "#,
        )
        .bind(farm_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = sensors.len(), farm_id = ?farm_id, "loaded sensors");
        Ok(sensors)
    }

    async fn fetch_thresholds(&self, sensor_id: &str) -> Result<RawThresholds, FetchError> {
        // ---
        let row: Option<(Option<JsonValue>,)> =
            sqlx::query_as("SELECT thresholds FROM sensors WHERE sensor_id = $1")
                .bind(sensor_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .and_then(|(thresholds,)| thresholds)
            .map(|thresholds| RawThresholds::from_json(&thresholds))
            .unwrap_or_default())
    }

    async fn fetch_readings(
        &self,
        sensor_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Reading>, FetchError> {
        // ---
        let mut readings = sqlx::query_as::<_, Reading>(
            r#"
            SELECT sensor_id, recorded_at AS "timestamp", value
            FROM sensor_readings
            WHERE sensor_id = ANY($1)
              AND recorded_at >= $2
              AND ($3::timestamptz IS NULL OR recorded_at <= $3)
            ORDER BY recorded_at DESC
            LIMIT $4
            "#,
        )
        .bind(sensor_ids)
        .bind(since)
        .bind(until)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        readings.reverse();
        Ok(readings)
    }

    fn source_name(&self) -> &str {
        "postgres"
    }
}
