//! Time-window selection and series merging.
//!
//! A window token resolves to a cutoff (and, for custom ranges, an upper
//! bound). Historical readings and live-buffer readings are filtered to the
//! window and merged by timestamp, live entries overwriting historical ones.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{FetchError, StaleDataWarning, WindowParseError};
use crate::models::Reading;

// ---

/// Logical time range requested by a chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeWindow {
    Last15m,
    #[default]
    Last1h,
    Last6h,
    Last24h,
    Custom {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimeWindow {
    // ---
    pub fn duration(&self) -> Duration {
        match self {
            Self::Last15m => Duration::minutes(15),
            Self::Last1h => Duration::hours(1),
            Self::Last6h => Duration::hours(6),
            Self::Last24h => Duration::hours(24),
            Self::Custom { start, end } => *end - *start,
        }
    }

    /// Inclusive `(cutoff, upper)` bounds relative to `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        match self {
            Self::Custom { start, end } => (*start, Some(*end)),
            rolling => (now - rolling.duration(), None),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = WindowParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        // ---
        let token = token.trim();
        match token {
            "15m" => return Ok(Self::Last15m),
            "1h" => return Ok(Self::Last1h),
            "6h" => return Ok(Self::Last6h),
            "24h" => return Ok(Self::Last24h),
            _ => {}
        }

        let inner = token
            .strip_prefix("custom(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| WindowParseError::Unknown(token.to_string()))?;
        let (start, end) = inner
            .split_once(',')
            .ok_or_else(|| WindowParseError::Unknown(token.to_string()))?;

        let start = parse_bound(start)?;
        let end = parse_bound(end)?;
        if start >= end {
            return Err(WindowParseError::EmptyRange);
        }
        Ok(Self::Custom { start, end })
    }
}

fn parse_bound(raw: &str) -> Result<DateTime<Utc>, WindowParseError> {
    // ---
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| WindowParseError::InvalidBound(raw.trim().to_string()))
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Last15m => f.write_str("15m"),
            Self::Last1h => f.write_str("1h"),
            Self::Last6h => f.write_str("6h"),
            Self::Last24h => f.write_str("24h"),
            Self::Custom { start, end } => {
                write!(f, "custom({},{})", start.to_rfc3339(), end.to_rfc3339())
            }
        }
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Merged series plus whether the historical half made it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedSeries {
    pub points: Vec<SeriesPoint>,
    pub complete: bool,
    pub warning: Option<StaleDataWarning>,
}

/// Merge historical and live readings inside `[cutoff, upper]`.
///
/// Output is strictly ascending by timestamp with no duplicates. Merging is
/// idempotent: feeding the output back in as historical data with the same
/// live set yields the same series.
pub fn merge_series(
    historical: &[Reading],
    live: &[Reading],
    cutoff: DateTime<Utc>,
    upper: Option<DateTime<Utc>>,
) -> Vec<SeriesPoint> {
    // ---
    let in_window =
        |r: &Reading| r.timestamp >= cutoff && upper.map_or(true, |u| r.timestamp <= u);

    let mut merged: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for reading in historical.iter().filter(|r| in_window(*r)) {
        merged.insert(reading.timestamp, reading.value);
    }
    for reading in live.iter().filter(|r| in_window(*r)) {
        merged.insert(reading.timestamp, reading.value);
    }

    merged
        .into_iter()
        .map(|(timestamp, value)| SeriesPoint { timestamp, value })
        .collect()
}

/// Merge with a failed historical fetch degrading to live-only data.
pub fn merge_or_fallback(
    historical: Result<Vec<Reading>, FetchError>,
    live: &[Reading],
    cutoff: DateTime<Utc>,
    upper: Option<DateTime<Utc>>,
) -> MergedSeries {
    // ---
    match historical {
        Ok(historical) => MergedSeries {
            points: merge_series(&historical, live, cutoff, upper),
            complete: true,
            warning: None,
        },
        Err(err) => {
            tracing::warn!(error = %err, "historical fetch failed, serving live buffer only");
            MergedSeries {
                points: merge_series(&[], live, cutoff, upper),
                complete: false,
                warning: Some(StaleDataWarning::new(format!(
                    "historical data unavailable: {err}"
                ))),
            }
        }
    }
}
