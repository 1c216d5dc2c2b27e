//! Farm/device rollups, fleet KPIs and trend arrows.
//!
//! Every average here guards its denominator: an empty population yields 0
//! (or `None` for reading values), never NaN or infinity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classify::SensorStatus;
use super::evaluate::SensorHealth;

// ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub normal: usize,
    pub warning: usize,
    pub critical: usize,
    pub offline: usize,
}

impl StatusCounts {
    // ---
    pub fn add(&mut self, status: SensorStatus) {
        match status {
            SensorStatus::Normal => self.normal += 1,
            SensorStatus::Warning => self.warning += 1,
            SensorStatus::Critical => self.critical += 1,
            SensorStatus::Offline => self.offline += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.normal + self.warning + self.critical + self.offline
    }

    pub fn online(&self) -> usize {
        self.total() - self.offline
    }

    pub fn anomalies(&self) -> usize {
        self.warning + self.critical
    }

    /// Banner status for a whole population.
    ///
    /// One critical sensor anywhere makes the population critical; an
    /// all-offline population is offline; an empty one is normal.
    pub fn overall(&self) -> SensorStatus {
        // ---
        if self.critical > 0 {
            SensorStatus::Critical
        } else if self.warning > 0 {
            SensorStatus::Warning
        } else if self.total() > 0 && self.offline == self.total() {
            SensorStatus::Offline
        } else {
            SensorStatus::Normal
        }
    }
}

/// Rollup shared by farm and device groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub sensor_count: usize,
    pub online_sensors: usize,
    pub counts: StatusCounts,
    pub avg_health: f64,
    pub latest_reading: Option<DateTime<Utc>>,
    pub overall_status: SensorStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmGroup {
    pub farm_id: String,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceGroup {
    pub device_id: String,
    pub farm_id: String,
    #[serde(flatten)]
    pub summary: GroupSummary,
}

pub fn summarize<'a>(sensors: impl IntoIterator<Item = &'a SensorHealth>) -> GroupSummary {
    // ---
    let mut counts = StatusCounts::default();
    let mut health_total = 0u64;
    let mut latest_reading: Option<DateTime<Utc>> = None;

    for health in sensors {
        counts.add(health.status.status);
        health_total += u64::from(health.health_score);
        if let Some(ts) = health.latest_timestamp() {
            latest_reading = Some(latest_reading.map_or(ts, |current| current.max(ts)));
        }
    }

    let sensor_count = counts.total();
    let avg_health = if sensor_count == 0 {
        0.0
    } else {
        health_total as f64 / sensor_count as f64
    };

    GroupSummary {
        sensor_count,
        online_sensors: counts.online(),
        counts,
        avg_health,
        latest_reading,
        overall_status: counts.overall(),
    }
}

/// One group per farm, ordered by `farm_id`.
pub fn farm_groups<'a>(sensors: impl IntoIterator<Item = &'a SensorHealth>) -> Vec<FarmGroup> {
    // ---
    let mut by_farm: BTreeMap<&str, Vec<&SensorHealth>> = BTreeMap::new();
    for health in sensors {
        by_farm.entry(health.sensor.farm_id.as_str()).or_default().push(health);
    }

    by_farm
        .into_iter()
        .map(|(farm_id, members)| FarmGroup {
            farm_id: farm_id.to_string(),
            summary: summarize(members),
        })
        .collect()
}

/// One group per device, ordered by `(farm_id, device_id)`.
pub fn device_groups<'a>(sensors: impl IntoIterator<Item = &'a SensorHealth>) -> Vec<DeviceGroup> {
    // ---
    let mut by_device: BTreeMap<(&str, &str), Vec<&SensorHealth>> = BTreeMap::new();
    for health in sensors {
        let key = (health.sensor.farm_id.as_str(), health.sensor.device_id.as_str());
        by_device.entry(key).or_default().push(health);
    }

    by_device
        .into_iter()
        .map(|((farm_id, device_id), members)| DeviceGroup {
            device_id: device_id.to_string(),
            farm_id: farm_id.to_string(),
            summary: summarize(members),
        })
        .collect()
}

/// Fleet-level figures for one filtered population at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total: usize,
    pub active: usize,
    pub uptime_percent: u8,
    pub anomalies: usize,
    pub avg_health: f64,
    pub avg_reading_value: Option<f64>,
    pub counts: StatusCounts,
    pub overall_status: SensorStatus,
}

impl KpiSnapshot {
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        kpi_snapshot(std::iter::empty(), taken_at)
    }
}

pub fn kpi_snapshot<'a>(
    sensors: impl IntoIterator<Item = &'a SensorHealth>,
    taken_at: DateTime<Utc>,
) -> KpiSnapshot {
    // ---
    let members: Vec<&SensorHealth> = sensors.into_iter().collect();
    let summary = summarize(members.iter().copied());

    let total = summary.sensor_count;
    let active = summary.online_sensors;

    let averages: Vec<f64> = members.iter().filter_map(|h| h.average_value).collect();
    let avg_reading_value = if averages.is_empty() {
        None
    } else {
        Some(averages.iter().sum::<f64>() / averages.len() as f64)
    };

    KpiSnapshot {
        taken_at,
        total,
        active,
        uptime_percent: percent(active, total),
        anomalies: summary.counts.anomalies(),
        avg_health: summary.avg_health,
        avg_reading_value,
        counts: summary.counts,
        overall_status: summary.overall_status,
    }
}

/// `round(part / total * 100)`, 0 for an empty total.
fn percent(part: usize, total: usize) -> u8 {
    // ---
    if total == 0 {
        return 0;
    }
    let ratio = (part.min(total) as f64 / total as f64) * 100.0;
    ratio.round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendColor {
    Success,
    Danger,
    Neutral,
}

/// Cosmetic comparison of one figure against the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub color: TrendColor,
    pub change: Option<f64>,
}

impl Trend {
    // ---
    pub const NONE: Trend = Trend {
        direction: TrendDirection::Flat,
        color: TrendColor::Neutral,
        change: None,
    };

    pub fn between(current: f64, previous: Option<f64>) -> Self {
        // ---
        let Some(previous) = previous else {
            return Self::NONE;
        };
        let (direction, color) = if current > previous {
            (TrendDirection::Up, TrendColor::Success)
        } else if current < previous {
            (TrendDirection::Down, TrendColor::Danger)
        } else {
            (TrendDirection::Flat, TrendColor::Neutral)
        };
        Self {
            direction,
            color,
            change: Some(current - previous),
        }
    }

    fn between_opt(current: Option<f64>, previous: Option<f64>) -> Self {
        match current {
            Some(current) => Self::between(current, previous),
            None => Self::NONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiTrends {
    pub active: Trend,
    pub uptime_percent: Trend,
    pub anomalies: Trend,
    pub avg_health: Trend,
    pub avg_reading_value: Trend,
}

impl KpiTrends {
    // ---
    /// Trends of `current` against `previous`; flat across the board when
    /// there is no previous snapshot yet.
    pub fn compare(current: &KpiSnapshot, previous: Option<&KpiSnapshot>) -> Self {
        // ---
        Self {
            active: Trend::between(current.active as f64, previous.map(|p| p.active as f64)),
            uptime_percent: Trend::between(
                f64::from(current.uptime_percent),
                previous.map(|p| f64::from(p.uptime_percent)),
            ),
            anomalies: Trend::between(
                current.anomalies as f64,
                previous.map(|p| p.anomalies as f64),
            ),
            avg_health: Trend::between(current.avg_health, previous.map(|p| p.avg_health)),
            avg_reading_value: Trend::between_opt(
                current.avg_reading_value,
                previous.and_then(|p| p.avg_reading_value),
            ),
        }
    }
}
