//! Per-sensor evaluation of one reading snapshot.
//!
//! [`evaluate`] is the explicit recompute step: every sensor is classified
//! against the same [`LiveBuffer`] and the same `now`, so no sensor in an
//! [`Evaluation`] ever sees newer data than another.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::classify::{classify, SensorStatus, StatusMessages, StatusResult};
use super::live::LiveBuffer;
use super::score::health_score;
use super::thresholds::{NormalizedThresholds, ThresholdSet};
use crate::models::Sensor;

// ---

/// A sensor together with its normalized thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredSensor {
    pub sensor: Sensor,
    pub thresholds: NormalizedThresholds,
}

/// Everything the rollups need to know about one sensor in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorHealth {
    // ---
    #[serde(flatten)]
    pub sensor: Sensor,
    pub thresholds: ThresholdSet,
    #[serde(flatten)]
    pub status: StatusResult,
    pub health_score: u8,
    /// Mean of the buffered readings; `None` when there are none.
    pub average_value: Option<f64>,
    /// Latest value's position inside `[min, max]`, 0 when unknown.
    pub range_percent: f64,
    /// Threshold fields that fell back to the sensor-type default.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defaulted_thresholds: Vec<&'static str>,
}

impl SensorHealth {
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.status.last_reading
    }
}

/// Optional narrowing of the sensor population.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorFilter {
    // ---
    pub farm_id: Option<String>,
    pub device_id: Option<String>,
    #[serde(rename = "type")]
    pub sensor_type: Option<String>,
    pub status: Option<SensorStatus>,
}

impl SensorFilter {
    // ---
    pub fn farm(farm_id: impl Into<String>) -> Self {
        Self {
            farm_id: Some(farm_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, health: &SensorHealth) -> bool {
        // ---
        let sensor = &health.sensor;
        self.farm_id.as_ref().map_or(true, |id| &sensor.farm_id == id)
            && self.device_id.as_ref().map_or(true, |id| &sensor.device_id == id)
            && self
                .sensor_type
                .as_ref()
                .map_or(true, |t| sensor.sensor_type.eq_ignore_ascii_case(t))
            && self.status.map_or(true, |s| health.status.status == s)
    }
}

/// Result of one recompute.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub evaluated_at: DateTime<Utc>,
    pub sensors: Vec<SensorHealth>,
}

impl Evaluation {
    // ---
    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorHealth> {
        self.sensors.iter().find(|h| h.sensor.sensor_id == sensor_id)
    }

    pub fn filtered<'a>(
        &'a self,
        filter: &'a SensorFilter,
    ) -> impl Iterator<Item = &'a SensorHealth> + 'a {
        self.sensors.iter().filter(move |h| filter.matches(h))
    }
}

/// Classify every sensor against one buffer snapshot.
pub fn evaluate(
    sensors: &[MonitoredSensor],
    live: &LiveBuffer,
    now: DateTime<Utc>,
    staleness_window: Option<Duration>,
    messages: &StatusMessages,
) -> Evaluation {
    // ---
    let sensors = sensors
        .iter()
        .map(|monitored| {
            let sensor = &monitored.sensor;
            let thresholds = monitored.thresholds.set;
            let latest = live.latest(&sensor.sensor_id);

            let status = classify(
                latest.as_ref(),
                &thresholds,
                now,
                staleness_window,
                &sensor.unit,
                messages,
            );
            let range_percent = status.value.map_or(0.0, |v| thresholds.range_percent(v));

            SensorHealth {
                sensor: sensor.clone(),
                thresholds,
                health_score: health_score(status.status),
                average_value: live.mean(&sensor.sensor_id),
                range_percent,
                defaulted_thresholds: monitored.thresholds.defaulted_fields(),
                status,
            }
        })
        .collect();

    Evaluation {
        evaluated_at: now,
        sensors,
    }
}
