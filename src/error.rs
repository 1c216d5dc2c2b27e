//! Error taxonomy for the health engine.
//!
//! Only data fetches can fail in a way the caller has to handle, and even
//! those are folded into a [`StaleDataWarning`] by the refresh path rather
//! than propagated to a crash. Threshold problems are reported as
//! [`ConfigError`] diagnostics and degrade to type defaults.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::engine::ThresholdSet;

// ---

/// Failure of the persistence/query collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    // ---
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sensor api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid sensor api url: {0}")]
    InvalidUrl(String),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("fetch task ended abnormally: {0}")]
    Task(String),
}

/// Threshold configuration that could not be used as given.
///
/// Never fatal: the normalizer substitutes type defaults or clamps, and the
/// engine logs these so a misconfigured sensor is visible in the logs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    // ---
    #[error("sensor {sensor_id}: no value for {fields:?}, using {sensor_type} defaults")]
    DefaultedThresholds {
        sensor_id: String,
        sensor_type: String,
        fields: Vec<&'static str>,
    },

    #[error("sensor {sensor_id}: thresholds out of order, clamped to {set:?}")]
    ClampedThresholds { sensor_id: String, set: ThresholdSet },

    #[error("sensor {sensor_id}: thresholds unavailable ({reason}), using type defaults")]
    ThresholdsUnavailable { sensor_id: String, reason: String },
}

/// Rejected time-range token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowParseError {
    // ---
    #[error("unknown window '{0}', expected 15m, 1h, 6h, 24h or custom(start,end)")]
    Unknown(String),

    #[error("invalid custom bound '{0}', expected an RFC 3339 timestamp")]
    InvalidBound(String),

    #[error("custom window start must be before its end")]
    EmptyRange,
}

/// Non-fatal flag: the data shown may be incomplete or out of date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleDataWarning {
    pub detected_at: DateTime<Utc>,
    pub reason: String,
}

impl StaleDataWarning {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            detected_at: Utc::now(),
            reason: reason.into(),
        }
    }
}
