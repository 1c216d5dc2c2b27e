//! Shared fixtures for integration tests: an in-memory data source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;

use farmsense_health::engine::EngineSettings;
use farmsense_health::{DataSource, FetchError, HealthEngine, RawThresholds, Reading, Sensor};

// ---

#[derive(Default)]
pub struct MemorySource {
    sensors: Mutex<Vec<Sensor>>,
    thresholds: Mutex<HashMap<String, JsonValue>>,
    readings: Mutex<Vec<Reading>>,
    pub fail_sensors: AtomicBool,
    pub fail_readings: AtomicBool,
    pub fail_thresholds: AtomicBool,
    pub reading_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_sensor(&self, sensor_id: &str, device_id: &str, farm_id: &str, sensor_type: &str) {
        self.sensors.lock().unwrap().push(Sensor {
            sensor_id: sensor_id.to_string(),
            device_id: device_id.to_string(),
            farm_id: farm_id.to_string(),
            sensor_type: sensor_type.to_string(),
            unit: "°C".to_string(),
        });
    }

    pub fn set_thresholds(&self, sensor_id: &str, thresholds: JsonValue) {
        self.thresholds
            .lock()
            .unwrap()
            .insert(sensor_id.to_string(), thresholds);
    }

    pub fn record(&self, sensor_id: &str, timestamp: DateTime<Utc>, value: f64) {
        self.readings
            .lock()
            .unwrap()
            .push(Reading::new(sensor_id, timestamp, value));
    }

    /// Record a reading `minutes` before now.
    pub fn record_ago(&self, sensor_id: &str, minutes: i64, value: f64) {
        self.record(sensor_id, Utc::now() - Duration::minutes(minutes), value);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_sensors.store(fail, Ordering::SeqCst);
        self.fail_readings.store(fail, Ordering::SeqCst);
    }
}

fn unavailable() -> FetchError {
    FetchError::Payload("memory source offline".to_string())
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch_sensors(&self, farm_id: Option<&str>) -> Result<Vec<Sensor>, FetchError> {
        if self.fail_sensors.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .sensors
            .lock()
            .unwrap()
            .iter()
            .filter(|s| farm_id.map_or(true, |id| s.farm_id == id))
            .cloned()
            .collect())
    }

    async fn fetch_thresholds(&self, sensor_id: &str) -> Result<RawThresholds, FetchError> {
        if self.fail_thresholds.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .thresholds
            .lock()
            .unwrap()
            .get(sensor_id)
            .map(RawThresholds::from_json)
            .unwrap_or_default())
    }

    async fn fetch_readings(
        &self,
        sensor_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Reading>, FetchError> {
        self.reading_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_readings.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut matched: Vec<Reading> = self
            .readings
            .lock()
            .unwrap()
            .iter()
            .filter(|r| sensor_ids.contains(&r.sensor_id))
            .filter(|r| r.timestamp >= since && until.map_or(true, |u| r.timestamp <= u))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.timestamp);
        let skip = matched.len().saturating_sub(limit as usize);
        Ok(matched.split_off(skip))
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

pub fn engine(source: Arc<MemorySource>) -> Arc<HealthEngine> {
    Arc::new(HealthEngine::new(source, EngineSettings::default()))
}

/// Temperature thresholds used throughout: critical outside (0, 50),
/// optimal 18..=25.
pub fn temperature_thresholds() -> JsonValue {
    serde_json::json!({ "min": 0, "max": 50, "optimal_min": 18, "optimal_max": 25 })
}
