//! Health score lookup.
//!
//! The score is an averaging proxy for rollups, not a calibrated index.

use super::classify::SensorStatus;

// ---

pub const fn health_score(status: SensorStatus) -> u8 {
    // ---
    match status {
        SensorStatus::Normal => 100,
        SensorStatus::Warning => 60,
        SensorStatus::Critical => 20,
        SensorStatus::Offline => 0,
    }
}
