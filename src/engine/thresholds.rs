//! Threshold normalization.
//!
//! Threshold configuration reaches the engine under three generations of
//! field names. [`normalize`] resolves each canonical field independently:
//! the explicit name wins, then the legacy name, then the default for the
//! sensor's type. The result is clamped into `min <= optimal_min <=
//! optimal_max <= max`; nothing here ever fails.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::RawThresholds;

// ---

/// Canonical thresholds for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    // ---
    pub min: f64,
    pub max: f64,
    pub optimal_min: f64,
    pub optimal_max: f64,
}

impl ThresholdSet {
    // ---
    pub const fn new(min: f64, max: f64, optimal_min: f64, optimal_max: f64) -> Self {
        Self {
            min,
            max,
            optimal_min,
            optimal_max,
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `value` inside `[min, max]` as a percentage.
    ///
    /// Returns 0 for a degenerate (zero-width) range instead of dividing by
    /// zero.
    pub fn range_percent(&self, value: f64) -> f64 {
        // ---
        let width = self.width();
        if width <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / width * 100.0).clamp(0.0, 100.0)
    }

    /// Force the ordering invariant. Returns whether anything moved.
    fn clamped(self) -> (Self, bool) {
        // ---
        let min = self.min;
        let max = self.max.max(min);
        let optimal_min = self.optimal_min.clamp(min, max);
        let optimal_max = self.optimal_max.clamp(optimal_min, max);

        let out = Self::new(min, max, optimal_min, optimal_max);
        (out, out != self)
    }
}

/// Sensor families with their own default thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
    SoilMoisture,
    Ph,
    Light,
    Co2,
    Pressure,
    WindSpeed,
    Other,
}

impl SensorKind {
    // ---
    pub const ALL: [Self; 9] = [
        Self::Temperature,
        Self::Humidity,
        Self::SoilMoisture,
        Self::Ph,
        Self::Light,
        Self::Co2,
        Self::Pressure,
        Self::WindSpeed,
        Self::Other,
    ];

    /// Map a free-form `type` string onto a kind. Case, dashes and spaces
    /// are ignored.
    pub fn from_type(sensor_type: &str) -> Self {
        // ---
        let key = sensor_type.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "temperature" | "temp" | "air_temperature" => Self::Temperature,
            "humidity" | "relative_humidity" => Self::Humidity,
            "soil_moisture" | "moisture" => Self::SoilMoisture,
            "ph" | "soil_ph" => Self::Ph,
            "light" | "lux" | "illuminance" => Self::Light,
            "co2" => Self::Co2,
            "pressure" | "barometric_pressure" => Self::Pressure,
            "wind_speed" | "wind" => Self::WindSpeed,
            _ => Self::Other,
        }
    }

    /// Type defaults. Every row keeps `min < optimal_min`, so a reading at
    /// the bottom of the optimal band (calm wind, darkness) is not critical.
    pub const fn default_thresholds(self) -> ThresholdSet {
        // ---
        match self {
            Self::Temperature => ThresholdSet::new(0.0, 50.0, 18.0, 25.0),
            Self::Humidity => ThresholdSet::new(0.0, 100.0, 40.0, 70.0),
            Self::SoilMoisture => ThresholdSet::new(0.0, 100.0, 30.0, 60.0),
            Self::Ph => ThresholdSet::new(0.0, 14.0, 6.0, 7.5),
            Self::Light => ThresholdSet::new(-1.0, 120_000.0, 0.0, 100_000.0),
            Self::Co2 => ThresholdSet::new(0.0, 5_000.0, 400.0, 1_000.0),
            Self::Pressure => ThresholdSet::new(900.0, 1_100.0, 980.0, 1_030.0),
            Self::WindSpeed => ThresholdSet::new(-1.0, 100.0, 0.0, 40.0),
            Self::Other => ThresholdSet::new(0.0, 100.0, 20.0, 80.0),
        }
    }
}

/// Where a canonical field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Explicit,
    Legacy,
    Default,
}

const FIELD_NAMES: [&str; 4] = ["min", "max", "optimal_min", "optimal_max"];

/// Normalizer output: the usable set plus what it took to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedThresholds {
    // ---
    pub set: ThresholdSet,
    /// Source of `min`, `max`, `optimal_min`, `optimal_max`, in that order.
    pub sources: [FieldSource; 4],
    pub clamped: bool,
}

impl NormalizedThresholds {
    // ---
    pub fn defaults_for(sensor_type: &str) -> Self {
        Self {
            set: SensorKind::from_type(sensor_type).default_thresholds(),
            sources: [FieldSource::Default; 4],
            clamped: false,
        }
    }

    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        // ---
        FIELD_NAMES
            .iter()
            .zip(self.sources)
            .filter(|(_, source)| *source == FieldSource::Default)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Diagnostics worth logging for this sensor, if any.
    pub fn issues(&self, sensor_id: &str, sensor_type: &str) -> Vec<ConfigError> {
        // ---
        let mut issues = Vec::new();

        let fields = self.defaulted_fields();
        if !fields.is_empty() {
            issues.push(ConfigError::DefaultedThresholds {
                sensor_id: sensor_id.to_string(),
                sensor_type: sensor_type.to_string(),
                fields,
            });
        }
        if self.clamped {
            issues.push(ConfigError::ClampedThresholds {
                sensor_id: sensor_id.to_string(),
                set: self.set,
            });
        }
        issues
    }
}

/// Fold raw threshold fields into a canonical [`ThresholdSet`].
pub fn normalize(raw: &RawThresholds, sensor_type: &str) -> NormalizedThresholds {
    // ---
    let defaults = SensorKind::from_type(sensor_type).default_thresholds();

    let (min, min_src) = resolve(raw.min, raw.min_critical, defaults.min);
    let (max, max_src) = resolve(raw.max, raw.max_critical, defaults.max);
    let (optimal_min, opt_min_src) =
        resolve(raw.optimal_min, raw.min_warning, defaults.optimal_min);
    let (optimal_max, opt_max_src) =
        resolve(raw.optimal_max, raw.max_warning, defaults.optimal_max);

    let (set, clamped) = ThresholdSet::new(min, max, optimal_min, optimal_max).clamped();

    NormalizedThresholds {
        set,
        sources: [min_src, max_src, opt_min_src, opt_max_src],
        clamped,
    }
}

fn resolve(explicit: Option<f64>, legacy: Option<f64>, default: f64) -> (f64, FieldSource) {
    // ---
    let explicit = explicit.filter(|v| v.is_finite());
    let legacy = legacy.filter(|v| v.is_finite());
    match (explicit, legacy) {
        (Some(value), _) => (value, FieldSource::Explicit),
        (None, Some(value)) => (value, FieldSource::Legacy),
        (None, None) => (default, FieldSource::Default),
    }
}
