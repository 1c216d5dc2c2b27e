//! Sensor health engine.
//!
//! Pure classification and aggregation live in the leaf modules and take
//! `now` and their inputs explicitly; [`HealthEngine`] is the only stateful
//! piece and wires them together behind atomic swaps.
//!
//! Gateway module (EMBP): everything outside `crate::engine` imports from
//! here, never from the leaf files.

mod anomaly;
mod classify;
mod delta;
mod evaluate;
mod history;
mod live;
mod rollup;
mod score;
mod service;
mod thresholds;
mod window;

pub use anomaly::{breached_bound, extract_anomalies, AnomalyRecord, BreachSide};
pub use classify::{classify, classify_value, SensorStatus, StatusMessages, StatusResult};
pub use delta::{delta_over, Delta};
pub use evaluate::{evaluate, Evaluation, MonitoredSensor, SensorFilter, SensorHealth};
pub use history::{EvaluationHistory, EvaluationPair};
pub use live::LiveBuffer;
pub use rollup::{
    device_groups, farm_groups, kpi_snapshot, summarize, DeviceGroup, FarmGroup, GroupSummary,
    KpiSnapshot, KpiTrends, StatusCounts, Trend, TrendColor, TrendDirection,
};
pub use score::health_score;
pub use service::{
    ApplyOutcome, EngineSettings, FetchedCycle, HealthEngine, KpiReport, SeriesReport,
};
pub use thresholds::{normalize, FieldSource, NormalizedThresholds, SensorKind, ThresholdSet};
pub use window::{merge_or_fallback, merge_series, MergedSeries, SeriesPoint, TimeWindow};
