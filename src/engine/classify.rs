//! Status classification.
//!
//! First match wins: offline, critical, warning, normal. The optimal band
//! is closed, and a value sitting exactly on `min` or `max` is already
//! critical. Message text comes from a caller-supplied [`StatusMessages`]
//! table so the classifier itself stays language-agnostic.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::thresholds::ThresholdSet;
use crate::models::Reading;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Normal,
    Warning,
    Critical,
    Offline,
}

impl SensorStatus {
    // ---
    pub const ALL: [SensorStatus; 4] = [
        SensorStatus::Normal,
        SensorStatus::Warning,
        SensorStatus::Critical,
        SensorStatus::Offline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Offline => "offline",
        }
    }

    pub fn is_online(self) -> bool {
        self != Self::Offline
    }

    pub fn is_anomalous(self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }

    /// Ordering key for anomaly lists; higher is more severe.
    pub(crate) fn severity(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::Warning => 2,
            Self::Offline => 1,
            Self::Normal => 0,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one sensor. Derived on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResult {
    // ---
    pub status: SensorStatus,
    pub value: Option<f64>,
    pub last_reading: Option<DateTime<Utc>>,
    pub message: String,
}

/// Localized message templates, one per status.
///
/// `{value}` and `{unit}` are substituted when rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusMessages {
    pub normal: String,
    pub warning: String,
    pub critical: String,
    pub offline: String,
}

impl Default for StatusMessages {
    fn default() -> Self {
        Self {
            normal: "Within optimal range: {value} {unit}".to_string(),
            warning: "Outside optimal range: {value} {unit}".to_string(),
            critical: "Outside safe limits: {value} {unit}".to_string(),
            offline: "No recent data".to_string(),
        }
    }
}

impl StatusMessages {
    // ---
    pub fn render(&self, status: SensorStatus, value: Option<f64>, unit: &str) -> String {
        // ---
        let template = match status {
            SensorStatus::Normal => &self.normal,
            SensorStatus::Warning => &self.warning,
            SensorStatus::Critical => &self.critical,
            SensorStatus::Offline => &self.offline,
        };
        let value = value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
        template
            .replace("{value}", &value)
            .replace("{unit}", unit)
            .trim_end()
            .to_string()
    }
}

/// Band classification of a value, ignoring staleness.
///
/// Anything not strictly inside `(min, max)` is critical, NaN included.
pub fn classify_value(value: f64, thresholds: &ThresholdSet) -> SensorStatus {
    // ---
    if !(value > thresholds.min && value < thresholds.max) {
        SensorStatus::Critical
    } else if value < thresholds.optimal_min || value > thresholds.optimal_max {
        SensorStatus::Warning
    } else {
        SensorStatus::Normal
    }
}

/// Classify a sensor from its latest reading.
///
/// `staleness_window` of `None` means only a missing reading is offline.
/// A reading whose age equals the window is still inside it; readings
/// stamped in the future (clock skew) count as fresh.
pub fn classify(
    latest: Option<&Reading>,
    thresholds: &ThresholdSet,
    now: DateTime<Utc>,
    staleness_window: Option<Duration>,
    unit: &str,
    messages: &StatusMessages,
) -> StatusResult {
    // ---
    let Some(reading) = latest else {
        return StatusResult {
            status: SensorStatus::Offline,
            value: None,
            last_reading: None,
            message: messages.render(SensorStatus::Offline, None, unit),
        };
    };

    let age = now - reading.timestamp;
    let stale = staleness_window.is_some_and(|window| age > window);

    let status = if stale || !reading.value.is_finite() {
        SensorStatus::Offline
    } else {
        classify_value(reading.value, thresholds)
    };

    StatusResult {
        status,
        value: Some(reading.value).filter(|v| v.is_finite()),
        last_reading: Some(reading.timestamp),
        message: messages.render(status, Some(reading.value), unit),
    }
}
