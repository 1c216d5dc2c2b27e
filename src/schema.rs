//! Database schema management for `farmsense-health`.
//!
//! Ensures the tables the PostgreSQL data source reads from exist before the
//! first refresh. Applied once on startup from `main.rs` (EMBP: single
//! gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the schema if missing (idempotent).
///
/// `sensors.thresholds` is free-form JSONB: rows written by older tooling
/// carry the legacy `min_critical`/`max_warning` names and are normalized
/// on read, not migrated.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_id    TEXT PRIMARY KEY,
            device_id    TEXT NOT NULL,
            farm_id      TEXT NOT NULL,
            sensor_type  TEXT NOT NULL,
            unit         TEXT NOT NULL DEFAULT '',
            thresholds   JSONB
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id           BIGSERIAL PRIMARY KEY,
            sensor_id    TEXT             NOT NULL REFERENCES sensors (sensor_id),
            recorded_at  TIMESTAMPTZ      NOT NULL,
            value        DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensors_farm_id
            ON sensors (farm_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Every reading query is "these sensors, newest first, since T".
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor_time
            ON sensor_readings (sensor_id, recorded_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
