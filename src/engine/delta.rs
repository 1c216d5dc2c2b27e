//! Change-over-interval for a merged series.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::window::SeriesPoint;

// ---

/// Change of a sensor's value over a fixed interval.
///
/// `Unavailable` when the series does not reach back far enough. It is
/// never collapsed into a zero change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Delta {
    Available {
        current: f64,
        reference: f64,
        reference_timestamp: DateTime<Utc>,
        change: f64,
    },
    Unavailable,
}

impl Delta {
    pub fn change(&self) -> Option<f64> {
        match self {
            Self::Available { change, .. } => Some(*change),
            Self::Unavailable => None,
        }
    }
}

/// Compare the newest point against the latest one at or before
/// `now - interval`. `series` must be ascending.
pub fn delta_over(series: &[SeriesPoint], interval: Duration, now: DateTime<Utc>) -> Delta {
    // ---
    let Some(current) = series.last() else {
        return Delta::Unavailable;
    };

    let target = now - interval;
    let idx = series.partition_point(|p| p.timestamp <= target);
    if idx == 0 {
        return Delta::Unavailable;
    }
    let reference = series[idx - 1];

    Delta::Available {
        current: current.value,
        reference: reference.value,
        reference_timestamp: reference.timestamp,
        change: current.value - reference.value,
    }
}
