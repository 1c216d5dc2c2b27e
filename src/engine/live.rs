//! In-memory live reading buffer.
//!
//! A [`LiveBuffer`] is an immutable snapshot. Merging new readings produces
//! a fresh buffer which the engine swaps in whole, so a reader always sees
//! one consistent set of readings.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::models::Reading;

// ---

#[derive(Debug, Clone, Default)]
pub struct LiveBuffer {
    series: HashMap<String, BTreeMap<DateTime<Utc>, f64>>,
    newest: Option<DateTime<Utc>>,
}

impl LiveBuffer {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this buffer with `readings` merged in and everything older
    /// than `cutoff` dropped. Later readings overwrite earlier ones at the
    /// same timestamp.
    pub fn merged_with(&self, readings: &[Reading], cutoff: DateTime<Utc>) -> Self {
        // ---
        let mut series = self.series.clone();

        for reading in readings.iter().filter(|r| r.timestamp >= cutoff) {
            series
                .entry(reading.sensor_id.clone())
                .or_default()
                .insert(reading.timestamp, reading.value);
        }

        for points in series.values_mut() {
            *points = points.split_off(&cutoff);
        }
        series.retain(|_, points| !points.is_empty());

        let newest = series
            .values()
            .filter_map(|points| points.keys().next_back().copied())
            .max();

        Self { series, newest }
    }

    /// Readings for one sensor, oldest first.
    pub fn readings(&self, sensor_id: &str) -> Vec<Reading> {
        // ---
        self.series
            .get(sensor_id)
            .map(|points| {
                points
                    .iter()
                    .map(|(ts, value)| Reading::new(sensor_id, *ts, *value))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn latest(&self, sensor_id: &str) -> Option<Reading> {
        // ---
        let (ts, value) = self.series.get(sensor_id)?.iter().next_back()?;
        Some(Reading::new(sensor_id, *ts, *value))
    }

    /// Mean of the finite buffered values for one sensor.
    pub fn mean(&self, sensor_id: &str) -> Option<f64> {
        // ---
        let points = self.series.get(sensor_id)?;
        let finite: Vec<f64> = points.values().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }

    /// Timestamp of the most recent reading across all sensors.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.newest
    }

    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
