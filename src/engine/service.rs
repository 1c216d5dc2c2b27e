//! The health engine.
//!
//! Owns the only mutable state in the system: the live reading buffer, the
//! current/previous evaluation pair, and the stale indicator. Each is
//! replaced by an atomic swap, so query methods never see a half-updated
//! structure and never block the refresh path.
//!
//! A cycle is split in two so the refresh controller can run the slow part
//! off to the side:
//! - [`HealthEngine::fetch_cycle`] does all the I/O and returns a snapshot;
//! - [`HealthEngine::apply`] is synchronous: merge, recompute, swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::anomaly::{extract_anomalies, AnomalyRecord};
use super::classify::{StatusMessages, StatusResult};
use super::delta::{delta_over, Delta};
use super::evaluate::{evaluate, MonitoredSensor, SensorFilter, SensorHealth};
use super::history::EvaluationHistory;
use super::live::LiveBuffer;
use super::rollup::{
    device_groups, farm_groups, kpi_snapshot, DeviceGroup, FarmGroup, KpiSnapshot, KpiTrends,
};
use super::thresholds::{normalize, NormalizedThresholds};
use super::window::{merge_or_fallback, MergedSeries, TimeWindow};
use crate::error::{ConfigError, FetchError, StaleDataWarning};
use crate::models::{RawThresholds, Reading, Sensor};
use crate::refresh::RefreshConfig;
use crate::source::DataSource;

// ---

/// Poll ticks of overlap kept on every incremental fetch, at minimum.
const REFETCH_TICKS: i32 = 4;

/// Engine tuning. Immutable once the engine is built.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    // ---
    pub refresh: RefreshConfig,
    /// How far back the live buffer reaches.
    pub live_retention: Duration,
    /// Interval used by the delta on series responses.
    pub delta_interval: Duration,
    /// Maximum readings requested per fetch.
    pub fetch_limit: u32,
    /// Restrict the engine to one farm.
    pub farm_scope: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig::default(),
            live_retention: Duration::hours(24),
            delta_interval: Duration::hours(1),
            fetch_limit: 10_000,
            farm_scope: None,
        }
    }
}

/// Everything one cycle fetched, taken at `requested_at`.
#[derive(Debug, Clone)]
pub struct FetchedCycle {
    /// Issue order of the cycle. Orders results independently of the clock.
    pub sequence: u64,
    pub requested_at: DateTime<Utc>,
    pub sensors: Vec<MonitoredSensor>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        sensors: usize,
        readings: usize,
    },
    /// Older than the snapshot already applied; nothing changed.
    Discarded {
        requested_at: DateTime<Utc>,
        last_applied: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub current: KpiSnapshot,
    pub previous: Option<KpiSnapshot>,
    pub trends: KpiTrends,
    pub stale: Option<StaleDataWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReport {
    pub sensor_id: String,
    pub window: TimeWindow,
    #[serde(flatten)]
    pub series: MergedSeries,
    pub delta: Delta,
}

pub struct HealthEngine {
    source: Arc<dyn DataSource>,
    settings: EngineSettings,
    messages: StatusMessages,
    live: ArcSwap<LiveBuffer>,
    history: EvaluationHistory,
    stale: ArcSwapOption<StaleDataWarning>,
    /// Sequence handed to the next fetched cycle.
    cycles: AtomicU64,
    /// Sequence and timestamp of the last applied cycle. Also serializes
    /// concurrent `apply` calls.
    last_applied: Mutex<Option<(u64, DateTime<Utc>)>>,
}

impl HealthEngine {
    // ---
    pub fn new(source: Arc<dyn DataSource>, settings: EngineSettings) -> Self {
        Self {
            source,
            settings,
            messages: StatusMessages::default(),
            live: ArcSwap::from_pointee(LiveBuffer::new()),
            history: EvaluationHistory::new(),
            stale: ArcSwapOption::empty(),
            cycles: AtomicU64::new(0),
            last_applied: Mutex::new(None),
        }
    }

    pub fn with_messages(mut self, messages: StatusMessages) -> Self {
        self.messages = messages;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Fetch sensors, thresholds and new readings.
    ///
    /// Readings are requested up to the cycle's own timestamp, so every
    /// sensor is later evaluated against the same cut of data. The lower
    /// bound overlaps earlier cycles (see [`Self::fetch_since`]) and the
    /// live buffer drops the duplicates.
    pub async fn fetch_cycle(&self) -> Result<FetchedCycle, FetchError> {
        // ---
        let sequence = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let requested_at = Utc::now();
        let since = self.fetch_since(requested_at);

        let sensors = self
            .source
            .fetch_sensors(self.settings.farm_scope.as_deref())
            .await?;

        let thresholds = join_all(
            sensors
                .iter()
                .map(|sensor| self.source.fetch_thresholds(&sensor.sensor_id)),
        )
        .await;

        let sensors: Vec<MonitoredSensor> = sensors
            .into_iter()
            .zip(thresholds)
            .map(|(sensor, raw)| monitor(sensor, raw))
            .collect();

        let sensor_ids: Vec<String> = sensors.iter().map(|m| m.sensor.sensor_id.clone()).collect();
        let readings = if sensor_ids.is_empty() {
            Vec::new()
        } else {
            self.source
                .fetch_readings(&sensor_ids, since, Some(requested_at), self.settings.fetch_limit)
                .await?
        };

        debug!(
            source = self.source.source_name(),
            sensors = sensors.len(),
            readings = readings.len(),
            since = %since,
            "refresh fetch complete"
        );

        Ok(FetchedCycle {
            sequence,
            requested_at,
            sensors,
            readings,
        })
    }

    /// Lower bound of the next readings fetch.
    ///
    /// Readings can be stored after newer ones from other sensors (batched
    /// gateway uploads, backfills), so one shared watermark would skip them.
    /// Every fetch reaches back at least the staleness window, or a few
    /// poll ticks when that is longer, and never past retention.
    fn fetch_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        // ---
        let floor = now - self.settings.live_retention;
        let Some(newest) = self.live.load().newest() else {
            return floor;
        };

        let refresh = &self.settings.refresh;
        let poll = Duration::from_std(refresh.poll_interval).unwrap_or_else(|_| Duration::zero());
        let overlap = refresh
            .staleness_window
            .unwrap_or_else(Duration::zero)
            .max(poll * REFETCH_TICKS);

        newest.min(now - overlap).max(floor)
    }

    /// Merge a fetched cycle and recompute every aggregate.
    ///
    /// A cycle issued before the last applied one is discarded. Issue
    /// order is the cycle sequence, so a wall clock stepping backwards
    /// does not freeze the view.
    pub fn apply(&self, cycle: FetchedCycle) -> ApplyOutcome {
        // ---
        let mut last_applied = self
            .last_applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some((last_sequence, last_at)) = *last_applied {
            if cycle.sequence <= last_sequence {
                debug!(
                    sequence = cycle.sequence,
                    last_sequence,
                    requested_at = %cycle.requested_at,
                    last_applied = %last_at,
                    "discarding out-of-order refresh result"
                );
                return ApplyOutcome::Discarded {
                    requested_at: cycle.requested_at,
                    last_applied: last_at,
                };
            }
        }

        let cutoff = cycle.requested_at - self.settings.live_retention;
        let live = Arc::new(self.live.load().merged_with(&cycle.readings, cutoff));
        let evaluation = evaluate(
            &cycle.sensors,
            &live,
            cycle.requested_at,
            self.settings.refresh.staleness_window,
            &self.messages,
        );

        self.live.store(live);
        self.history.rotate(evaluation);
        self.stale.store(None);
        *last_applied = Some((cycle.sequence, cycle.requested_at));

        ApplyOutcome::Applied {
            sensors: cycle.sensors.len(),
            readings: cycle.readings.len(),
        }
    }

    /// One fetch-and-apply cycle outside the timer.
    pub async fn refresh_now(&self) -> Result<ApplyOutcome, FetchError> {
        // ---
        match self.fetch_cycle().await {
            Ok(cycle) => {
                let outcome = self.apply(cycle);
                info!(?outcome, "manual refresh finished");
                Ok(outcome)
            }
            Err(err) => {
                self.mark_stale(&err);
                Err(err)
            }
        }
    }

    /// Flag the current view as stale. Keeps the first detection time
    /// while the failure persists.
    pub(crate) fn mark_stale(&self, err: &FetchError) {
        // ---
        let detected_at = self
            .stale
            .load_full()
            .map_or_else(Utc::now, |warning| warning.detected_at);
        self.stale.store(Some(Arc::new(StaleDataWarning {
            detected_at,
            reason: err.to_string(),
        })));
    }

    pub fn stale(&self) -> Option<StaleDataWarning> {
        self.stale.load_full().map(|warning| (*warning).clone())
    }

    pub fn last_evaluated_at(&self) -> Option<DateTime<Utc>> {
        let pair = self.history.load();
        pair.current.as_ref().map(|e| e.evaluated_at)
    }

    pub fn live_readings(&self) -> usize {
        self.live.load().len()
    }

    // --- output queries

    pub fn get_sensor(&self, sensor_id: &str) -> Option<SensorHealth> {
        let pair = self.history.load();
        pair.current.as_ref()?.sensor(sensor_id).cloned()
    }

    pub fn get_status(&self, sensor_id: &str) -> Option<StatusResult> {
        self.get_sensor(sensor_id).map(|health| health.status)
    }

    pub fn get_farm_groups(&self, filter: &SensorFilter) -> Vec<FarmGroup> {
        let pair = self.history.load();
        pair.current
            .as_ref()
            .map(|e| farm_groups(e.filtered(filter)))
            .unwrap_or_default()
    }

    pub fn get_device_groups(&self, filter: &SensorFilter) -> Vec<DeviceGroup> {
        let pair = self.history.load();
        pair.current
            .as_ref()
            .map(|e| device_groups(e.filtered(filter)))
            .unwrap_or_default()
    }

    /// KPIs for the filtered population with trends against the previous
    /// cycle's evaluation of the same filter.
    pub fn get_kpi_snapshot(&self, filter: &SensorFilter) -> KpiReport {
        // ---
        let pair = self.history.load();
        let current = pair.current.as_ref().map_or_else(
            || KpiSnapshot::empty(Utc::now()),
            |e| kpi_snapshot(e.filtered(filter), e.evaluated_at),
        );
        let previous = pair
            .previous
            .as_ref()
            .map(|e| kpi_snapshot(e.filtered(filter), e.evaluated_at));
        let trends = KpiTrends::compare(&current, previous.as_ref());

        KpiReport {
            current,
            previous,
            trends,
            stale: self.stale(),
        }
    }

    pub fn get_anomalies(&self, filter: &SensorFilter) -> Vec<AnomalyRecord> {
        let pair = self.history.load();
        pair.current
            .as_ref()
            .map(|e| extract_anomalies(e.filtered(filter)))
            .unwrap_or_default()
    }

    /// Chart series for one sensor: historical readings merged with the
    /// live buffer. `None` for a sensor the engine does not know.
    ///
    /// A failed historical fetch degrades to live-only data flagged as
    /// incomplete.
    pub async fn get_series(&self, sensor_id: &str, window: TimeWindow) -> Option<SeriesReport> {
        // ---
        self.get_sensor(sensor_id)?;

        let now = Utc::now();
        let (cutoff, upper) = window.bounds(now);
        let ids = [sensor_id.to_string()];

        let historical = self
            .source
            .fetch_readings(&ids, cutoff, upper, self.settings.fetch_limit)
            .await;
        let live = self.live.load().readings(sensor_id);

        let series = merge_or_fallback(historical, &live, cutoff, upper);
        let delta = delta_over(&series.points, self.settings.delta_interval, upper.unwrap_or(now));

        Some(SeriesReport {
            sensor_id: sensor_id.to_string(),
            window,
            series,
            delta,
        })
    }
}

/// Normalize one sensor's thresholds, degrading to defaults on failure.
fn monitor(sensor: Sensor, raw: Result<RawThresholds, FetchError>) -> MonitoredSensor {
    // ---
    let thresholds = match raw {
        Ok(raw) => {
            let normalized = normalize(&raw, &sensor.sensor_type);
            for issue in normalized.issues(&sensor.sensor_id, &sensor.sensor_type) {
                debug!(sensor_id = %sensor.sensor_id, "{issue}");
            }
            normalized
        }
        Err(err) => {
            let issue = ConfigError::ThresholdsUnavailable {
                sensor_id: sensor.sensor_id.clone(),
                reason: err.to_string(),
            };
            warn!(sensor_id = %sensor.sensor_id, "{issue}");
            NormalizedThresholds::defaults_for(&sensor.sensor_type)
        }
    };

    MonitoredSensor { sensor, thresholds }
}
