//! Anomaly extraction.
//!
//! Sensors currently in warning or critical, most severe first and newest
//! first within a severity. Each record names the bound it crossed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classify::SensorStatus;
use super::evaluate::SensorHealth;
use super::thresholds::ThresholdSet;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachSide {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    // ---
    pub sensor_id: String,
    pub device_id: String,
    pub farm_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub unit: String,
    pub status: SensorStatus,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Critical bound for critical records, optimal-band bound for warnings.
    pub threshold: f64,
    pub side: BreachSide,
    pub message: String,
}

/// The bound `value` crossed to earn `status`, if it is an anomaly.
pub fn breached_bound(
    status: SensorStatus,
    value: f64,
    thresholds: &ThresholdSet,
) -> Option<(f64, BreachSide)> {
    // ---
    match status {
        SensorStatus::Critical if value <= thresholds.min => {
            Some((thresholds.min, BreachSide::Low))
        }
        SensorStatus::Critical => Some((thresholds.max, BreachSide::High)),
        SensorStatus::Warning if value < thresholds.optimal_min => {
            Some((thresholds.optimal_min, BreachSide::Low))
        }
        SensorStatus::Warning => Some((thresholds.optimal_max, BreachSide::High)),
        SensorStatus::Normal | SensorStatus::Offline => None,
    }
}

pub fn extract_anomalies<'a>(
    sensors: impl IntoIterator<Item = &'a SensorHealth>,
) -> Vec<AnomalyRecord> {
    // ---
    let mut records: Vec<AnomalyRecord> = sensors
        .into_iter()
        .filter(|h| h.status.status.is_anomalous())
        .filter_map(|h| {
            let value = h.status.value?;
            let timestamp = h.status.last_reading?;
            let (threshold, side) = breached_bound(h.status.status, value, &h.thresholds)?;
            Some(AnomalyRecord {
                sensor_id: h.sensor.sensor_id.clone(),
                device_id: h.sensor.device_id.clone(),
                farm_id: h.sensor.farm_id.clone(),
                sensor_type: h.sensor.sensor_type.clone(),
                unit: h.sensor.unit.clone(),
                status: h.status.status,
                value,
                timestamp,
                threshold,
                side,
                message: h.status.message.clone(),
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.status
            .severity()
            .cmp(&a.status.severity())
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.sensor_id.cmp(&b.sensor_id))
    });
    records
}
