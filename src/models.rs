//! Data models exchanged with the persistence collaborator.
//!
//! These are read-only views: sensors, devices and farms are owned by the
//! collaborator, the engine only evaluates snapshots of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ---

/// A sensor and its place in the farm/device hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sensor {
    // ---
    pub sensor_id: String,
    pub device_id: String,
    pub farm_id: String,
    #[serde(rename = "type", alias = "sensor_type")]
    pub sensor_type: String,
    #[serde(default)]
    pub unit: String,
}

/// A single recorded value. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reading {
    // ---
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
        }
    }
}

/// Threshold fields as they arrive, under any of their historical names.
///
/// Nothing past the normalizer sees this type; it only exists to carry the
/// loosely-typed configuration up to `engine::normalize`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawThresholds {
    // ---
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub optimal_min: Option<f64>,
    pub optimal_max: Option<f64>,
    pub min_critical: Option<f64>,
    pub max_critical: Option<f64>,
    pub min_warning: Option<f64>,
    pub max_warning: Option<f64>,
}

impl RawThresholds {
    // ---
    /// Coerce a JSON object into raw thresholds.
    ///
    /// Numbers and numeric strings are both accepted. Anything else,
    /// including non-finite values, counts as absent.
    pub fn from_json(config: &JsonValue) -> Self {
        // ---
        Self {
            min: config_f64(config, "min"),
            max: config_f64(config, "max"),
            optimal_min: config_f64(config, "optimal_min"),
            optimal_max: config_f64(config, "optimal_max"),
            min_critical: config_f64(config, "min_critical"),
            max_critical: config_f64(config, "max_critical"),
            min_warning: config_f64(config, "min_warning"),
            max_warning: config_f64(config, "max_warning"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn config_f64(config: &JsonValue, key: &str) -> Option<f64> {
    // ---
    let value = match config.get(key)? {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}
