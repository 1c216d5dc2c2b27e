//! Refresh controller.
//!
//! Drives [`HealthEngine`] on a fixed interval. At most one fetch is in
//! flight; ticks that arrive while it runs are dropped and counted, never
//! queued. A failed fetch keeps the previous view and flags it stale.
//!
//! ```text
//! Idle --tick--> Fetching --ok--> Merging --> Idle
//!                   |--err--> Idle (stale flagged)
//! auto-refresh off: Idle <--> Disabled     cancel: any --> Stopped
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{ApplyOutcome, FetchedCycle, HealthEngine};
use crate::error::FetchError;

// ---

/// Polling/live-mode configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    // ---
    pub poll_interval: StdDuration,
    pub auto_refresh: bool,
    /// Readings older than this count as offline. `None` disables the age
    /// check, so only a missing reading is offline.
    pub staleness_window: Option<Duration>,
}

impl RefreshConfig {
    // ---
    pub fn from_millis(
        poll_interval_ms: u64,
        auto_refresh: bool,
        staleness_window_ms: u64,
    ) -> Self {
        // ---
        let staleness_window = i64::try_from(staleness_window_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::milliseconds);

        Self {
            poll_interval: StdDuration::from_millis(poll_interval_ms.max(1)),
            auto_refresh,
            staleness_window,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::from_millis(15_000, true, 30 * 60 * 1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Idle,
    Fetching,
    Merging,
    Disabled,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub cycles_applied: u64,
    pub ticks_dropped: u64,
    pub fetch_failures: u64,
    pub responses_discarded: u64,
}

struct Shared {
    state: watch::Sender<RefreshState>,
    auto_refresh: AtomicBool,
    cycles_applied: AtomicU64,
    ticks_dropped: AtomicU64,
    fetch_failures: AtomicU64,
    responses_discarded: AtomicU64,
}

impl Shared {
    // ---
    fn resting_state(&self) -> RefreshState {
        if self.auto_refresh.load(Ordering::Relaxed) {
            RefreshState::Idle
        } else {
            RefreshState::Disabled
        }
    }

    fn publish(&self, state: RefreshState) {
        self.state.send_replace(state);
    }
}

pub struct RefreshController {
    engine: Arc<HealthEngine>,
}

impl RefreshController {
    // ---
    pub fn new(engine: Arc<HealthEngine>) -> Self {
        Self { engine }
    }

    /// Spawn the refresh loop. It runs until `cancel` fires or the returned
    /// handle is dropped.
    pub fn start(self, cancel: CancellationToken) -> RefreshHandle {
        // ---
        let auto_refresh = self.engine.settings().refresh.auto_refresh;
        let initial = if auto_refresh {
            RefreshState::Idle
        } else {
            RefreshState::Disabled
        };
        let (state, receiver) = watch::channel(initial);

        let shared = Arc::new(Shared {
            state,
            auto_refresh: AtomicBool::new(auto_refresh),
            cycles_applied: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            responses_discarded: AtomicU64::new(0),
        });

        info!(
            poll_interval_ms = self.engine.settings().refresh.poll_interval.as_millis() as u64,
            auto_refresh,
            source = self.engine.source_name(),
            "starting refresh controller"
        );

        let task = tokio::spawn(run(self.engine, Arc::clone(&shared), cancel.clone()));

        RefreshHandle {
            shared,
            state: receiver,
            cancel,
            task: Some(task),
        }
    }
}

type FetchTask = JoinHandle<Result<FetchedCycle, FetchError>>;

async fn run(engine: Arc<HealthEngine>, shared: Arc<Shared>, cancel: CancellationToken) {
    // ---
    let mut ticker = tokio::time::interval(engine.settings().refresh.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<FetchTask> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            joined = join_in_flight(&mut in_flight) => {
                in_flight = None;
                finish_cycle(&engine, &shared, joined);
            }
            _ = ticker.tick() => {
                if in_flight.is_some() {
                    shared.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("refresh tick dropped, fetch still in flight");
                    continue;
                }
                if !shared.auto_refresh.load(Ordering::Relaxed) {
                    shared.publish(RefreshState::Disabled);
                    continue;
                }

                shared.publish(RefreshState::Fetching);
                let engine = Arc::clone(&engine);
                in_flight = Some(tokio::spawn(async move { engine.fetch_cycle().await }));
            }
        }
    }

    if let Some(task) = in_flight.take() {
        task.abort();
    }
    shared.publish(RefreshState::Stopped);
    info!("refresh controller stopped");
}

/// Resolves when the in-flight fetch ends; never resolves when idle.
async fn join_in_flight(
    task: &mut Option<FetchTask>,
) -> Result<Result<FetchedCycle, FetchError>, JoinError> {
    // ---
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn finish_cycle(
    engine: &HealthEngine,
    shared: &Shared,
    joined: Result<Result<FetchedCycle, FetchError>, JoinError>,
) {
    // ---
    let fetched = match joined {
        Ok(fetched) => fetched,
        Err(err) => Err(FetchError::Task(err.to_string())),
    };

    match fetched {
        Ok(cycle) => {
            shared.publish(RefreshState::Merging);
            match engine.apply(cycle) {
                ApplyOutcome::Applied { sensors, readings } => {
                    shared.cycles_applied.fetch_add(1, Ordering::Relaxed);
                    debug!(sensors, readings, "refresh cycle applied");
                }
                ApplyOutcome::Discarded { .. } => {
                    shared.responses_discarded.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(err) => {
            shared.fetch_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "refresh fetch failed, keeping previous view");
            engine.mark_stale(&err);
        }
    }

    shared.publish(shared.resting_state());
}

/// Control surface of a running controller. Dropping it stops the loop.
pub struct RefreshHandle {
    shared: Arc<Shared>,
    state: watch::Receiver<RefreshState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    // ---
    pub fn state(&self) -> RefreshState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.clone()
    }

    pub fn auto_refresh(&self) -> bool {
        self.shared.auto_refresh.load(Ordering::Relaxed)
    }

    /// Toggle live mode. Takes effect on the next tick; an in-flight fetch
    /// still completes.
    pub fn set_auto_refresh(&self, enabled: bool) {
        // ---
        self.shared.auto_refresh.store(enabled, Ordering::Relaxed);
        self.shared.state.send_if_modified(|state| match (*state, enabled) {
            (RefreshState::Idle, false) => {
                *state = RefreshState::Disabled;
                true
            }
            (RefreshState::Disabled, true) => {
                *state = RefreshState::Idle;
                true
            }
            _ => false,
        });
        info!(enabled, "auto refresh toggled");
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            cycles_applied: self.shared.cycles_applied.load(Ordering::Relaxed),
            ticks_dropped: self.shared.ticks_dropped.load(Ordering::Relaxed),
            fetch_failures: self.shared.fetch_failures.load(Ordering::Relaxed),
            responses_discarded: self.shared.responses_discarded.load(Ordering::Relaxed),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        // ---
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "refresh controller task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::engine::EngineSettings;
    use crate::models::{RawThresholds, Reading, Sensor};
    use crate::source::DataSource;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Sensor fetches block on `gate` so tests decide when a cycle finishes.
    struct GatedSource {
        gate: Semaphore,
        sensor_calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl GatedSource {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                sensor_calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.sensor_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for GatedSource {
        async fn fetch_sensors(&self, _farm_id: Option<&str>) -> Result<Vec<Sensor>, FetchError> {
            self.sensor_calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Payload("backend unavailable".to_string()));
            }
            Ok(vec![Sensor {
                sensor_id: "s1".to_string(),
                device_id: "d1".to_string(),
                farm_id: "f1".to_string(),
                sensor_type: "temperature".to_string(),
                unit: "°C".to_string(),
            }])
        }

        async fn fetch_thresholds(&self, _sensor_id: &str) -> Result<RawThresholds, FetchError> {
            Ok(RawThresholds::default())
        }

        async fn fetch_readings(
            &self,
            _sensor_ids: &[String],
            _since: DateTime<Utc>,
            _until: Option<DateTime<Utc>>,
            _limit: u32,
        ) -> Result<Vec<Reading>, FetchError> {
            Ok(vec![Reading::new("s1", Utc::now(), 21.0)])
        }

        fn source_name(&self) -> &str {
            "gated"
        }
    }

    fn engine(source: Arc<GatedSource>, auto_refresh: bool) -> Arc<HealthEngine> {
        let settings = EngineSettings {
            refresh: RefreshConfig::from_millis(10_000, auto_refresh, 30 * 60 * 1000),
            ..EngineSettings::default()
        };
        Arc::new(HealthEngine::new(source, settings))
    }

    #[test]
    fn test_refresh_config_from_millis() {
        // ---
        let cfg = RefreshConfig::from_millis(15_000, true, 0);
        assert_eq!(cfg.poll_interval, StdDuration::from_secs(15));
        assert_eq!(cfg.staleness_window, None);

        let cfg = RefreshConfig::from_millis(0, false, 60_000);
        assert_eq!(cfg.poll_interval, StdDuration::from_millis(1));
        assert_eq!(cfg.staleness_window, Some(Duration::minutes(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_drops_ticks_instead_of_queueing() {
        // ---
        let source = GatedSource::new(0);
        let engine = engine(Arc::clone(&source), true);
        let handle = RefreshController::new(Arc::clone(&engine)).start(CancellationToken::new());

        // First tick fires immediately; the fetch blocks across three more.
        tokio::time::sleep(StdDuration::from_secs(35)).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.state(), RefreshState::Fetching);
        assert!(handle.stats().ticks_dropped >= 1);
        assert_eq!(handle.stats().cycles_applied, 0);

        source.gate.add_permits(1);
        tokio::time::sleep(StdDuration::from_secs(2)).await;

        assert_eq!(handle.stats().cycles_applied, 1);
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.state(), RefreshState::Idle);
        assert!(engine.get_status("s1").is_some());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_controller_does_not_fetch_until_enabled() {
        // ---
        let source = GatedSource::new(100);
        let engine = engine(Arc::clone(&source), false);
        let handle = RefreshController::new(engine).start(CancellationToken::new());

        tokio::time::sleep(StdDuration::from_secs(25)).await;
        assert_eq!(source.calls(), 0);
        assert_eq!(handle.state(), RefreshState::Disabled);

        handle.set_auto_refresh(true);
        assert_eq!(handle.state(), RefreshState::Idle);
        tokio::time::sleep(StdDuration::from_secs(10)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(handle.stats().cycles_applied, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_marks_stale_and_keeps_running() {
        // ---
        let source = GatedSource::new(100);
        source.fail.store(true, Ordering::SeqCst);
        let engine = engine(Arc::clone(&source), true);
        let handle = RefreshController::new(Arc::clone(&engine)).start(CancellationToken::new());

        tokio::time::sleep(StdDuration::from_secs(15)).await;

        assert_eq!(handle.stats().fetch_failures, 2);
        assert_eq!(handle.state(), RefreshState::Idle);
        let stale = engine.stale().unwrap();
        assert!(stale.reason.contains("backend unavailable"));

        source.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_secs(10)).await;

        assert_eq!(handle.stats().cycles_applied, 1);
        assert!(engine.stale().is_none());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop_and_aborts_in_flight_fetch() {
        // ---
        let source = GatedSource::new(0);
        let cancel = CancellationToken::new();
        let handle = RefreshController::new(engine(source, true)).start(cancel.clone());
        let mut state = handle.subscribe();

        state.wait_for(|s| *s == RefreshState::Fetching).await.unwrap();
        cancel.cancel();
        state.wait_for(|s| *s == RefreshState::Stopped).await.unwrap();

        assert_eq!(handle.stats().cycles_applied, 0);
        handle.shutdown().await;
    }
}
