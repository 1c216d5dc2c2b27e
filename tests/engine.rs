//! End-to-end engine behaviour against an in-memory data source.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use common::{engine, temperature_thresholds, MemorySource};
use farmsense_health::engine::{
    ApplyOutcome, BreachSide, Delta, EngineSettings, SensorFilter, SensorStatus, TimeWindow,
    TrendDirection,
};
use farmsense_health::HealthEngine;

// ---

/// farm-a: t1 normal, t2 warning, t3 critical.
/// farm-b: h1 humidity on type defaults, h2 never reported.
fn two_farms() -> Arc<MemorySource> {
    // ---
    let source = MemorySource::new();
    for (id, device) in [("t1", "dev-1"), ("t2", "dev-1"), ("t3", "dev-2")] {
        source.add_sensor(id, device, "farm-a", "temperature");
        source.set_thresholds(id, temperature_thresholds());
    }
    source.add_sensor("h1", "dev-3", "farm-b", "humidity");
    source.add_sensor("h2", "dev-3", "farm-b", "humidity");

    source.record_ago("t1", 3, 21.0);
    source.record_ago("t1", 2, 22.0);
    source.record_ago("t2", 2, 30.0);
    source.record_ago("t3", 1, 55.0);
    source.record_ago("h1", 4, 50.0);
    source
}

/// Keeps consecutive cycles on distinct timestamps.
async fn tick() {
    tokio::time::sleep(StdDuration::from_millis(5)).await;
}

#[tokio::test]
async fn refresh_classifies_every_sensor() {
    // ---
    let engine = engine(two_farms());

    let outcome = assert_ok!(engine.refresh_now().await);
    assert_eq!(
        outcome,
        ApplyOutcome::Applied {
            sensors: 5,
            readings: 5
        }
    );

    let status = |id: &str| engine.get_status(id).map(|s| s.status);
    assert_eq!(status("t1"), Some(SensorStatus::Normal));
    assert_eq!(status("t2"), Some(SensorStatus::Warning));
    assert_eq!(status("t3"), Some(SensorStatus::Critical));
    assert_eq!(status("h1"), Some(SensorStatus::Normal));
    assert_eq!(status("h2"), Some(SensorStatus::Offline));
    assert_eq!(status("nope"), None);

    let t1 = engine.get_status("t1").unwrap();
    assert_eq!(t1.value, Some(22.0));
    assert_eq!(t1.message, "Within optimal range: 22.0 °C");

    let h1 = engine.get_sensor("h1").unwrap();
    assert_eq!(h1.defaulted_thresholds.len(), 4);
    assert!(engine.get_sensor("t1").unwrap().defaulted_thresholds.is_empty());
}

#[tokio::test]
async fn farm_rollup_follows_precedence() {
    // ---
    let engine = engine(two_farms());
    assert_ok!(engine.refresh_now().await);

    let farms = engine.get_farm_groups(&SensorFilter::default());
    let ids: Vec<&str> = farms.iter().map(|f| f.farm_id.as_str()).collect();
    assert_eq!(ids, vec!["farm-a", "farm-b"]);

    let farm_a = &farms[0].summary;
    assert_eq!(farm_a.overall_status, SensorStatus::Critical);
    assert_eq!(farm_a.sensor_count, 3);
    assert!((farm_a.avg_health - 60.0).abs() < 1e-9);

    let farm_b = &farms[1].summary;
    assert_eq!(farm_b.overall_status, SensorStatus::Normal);
    assert_eq!(farm_b.online_sensors, 1);
    assert!((farm_b.avg_health - 50.0).abs() < 1e-9);

    let devices = engine.get_device_groups(&SensorFilter::farm("farm-a"));
    let ids: Vec<&str> = devices.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, vec!["dev-1", "dev-2"]);
    assert_eq!(devices[0].summary.overall_status, SensorStatus::Warning);
}

#[tokio::test]
async fn kpis_trend_against_previous_cycle() {
    // ---
    let source = two_farms();
    let engine = engine(Arc::clone(&source));

    assert_ok!(engine.refresh_now().await);
    let first = engine.get_kpi_snapshot(&SensorFilter::default());
    assert_eq!(first.current.total, 5);
    assert_eq!(first.current.active, 4);
    assert_eq!(first.current.uptime_percent, 80);
    assert_eq!(first.current.anomalies, 2);
    assert!(first.previous.is_none());
    assert_eq!(first.trends.anomalies.direction, TrendDirection::Flat);
    assert_eq!(first.trends.anomalies.change, None);

    // t3 recovers.
    tick().await;
    source.record("t3", Utc::now(), 20.0);
    tick().await;
    assert_ok!(engine.refresh_now().await);

    let second = engine.get_kpi_snapshot(&SensorFilter::default());
    assert_eq!(second.current.anomalies, 1);
    assert_eq!(second.previous.as_ref().map(|p| p.anomalies), Some(2));
    assert_eq!(second.trends.anomalies.direction, TrendDirection::Down);
    assert_eq!(second.trends.anomalies.change, Some(-1.0));
    assert_eq!(second.trends.avg_health.direction, TrendDirection::Up);
    assert!(second.stale.is_none());

    let farm_b = engine.get_kpi_snapshot(&SensorFilter::farm("farm-b"));
    assert_eq!(farm_b.current.total, 2);
    assert_eq!(farm_b.current.anomalies, 0);
}

#[tokio::test]
async fn empty_engine_reports_empty_views() {
    // ---
    let engine = engine(MemorySource::new());

    let kpis = engine.get_kpi_snapshot(&SensorFilter::default());
    assert_eq!(kpis.current.total, 0);
    assert_eq!(kpis.current.uptime_percent, 0);
    assert_eq!(kpis.current.overall_status, SensorStatus::Normal);
    assert!(engine.get_farm_groups(&SensorFilter::default()).is_empty());
    assert!(engine.get_anomalies(&SensorFilter::default()).is_empty());
    assert_eq!(engine.last_evaluated_at(), None);

    assert_ok!(engine.refresh_now().await);
    assert!(engine.last_evaluated_at().is_some());
    assert_eq!(engine.get_kpi_snapshot(&SensorFilter::default()).current.total, 0);
}

#[tokio::test]
async fn old_reading_is_offline_even_when_buffered() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.set_thresholds("t1", temperature_thresholds());
    source.record_ago("t1", 120, 22.0);

    let engine = engine(source);
    assert_ok!(engine.refresh_now().await);

    let status = engine.get_status("t1").unwrap();
    assert_eq!(status.status, SensorStatus::Offline);
    assert_eq!(status.value, Some(22.0));
    assert_eq!(engine.get_sensor("t1").unwrap().health_score, 0);
    assert_eq!(engine.live_readings(), 1);
}

#[tokio::test]
async fn fetch_failure_keeps_last_view_and_flags_stale() {
    // ---
    let source = two_farms();
    let engine = engine(Arc::clone(&source));
    assert_ok!(engine.refresh_now().await);
    let evaluated_at = engine.last_evaluated_at();

    source.fail_all(true);
    assert_err!(engine.refresh_now().await);
    let first_stale = engine.stale().unwrap();
    assert!(first_stale.reason.contains("memory source offline"));

    tick().await;
    assert_err!(engine.refresh_now().await);
    assert_eq!(engine.stale().unwrap().detected_at, first_stale.detected_at);

    assert_eq!(engine.last_evaluated_at(), evaluated_at);
    assert_eq!(engine.get_status("t3").map(|s| s.status), Some(SensorStatus::Critical));
    assert!(engine.get_kpi_snapshot(&SensorFilter::default()).stale.is_some());

    source.fail_all(false);
    assert_ok!(engine.refresh_now().await);
    assert!(engine.stale().is_none());
}

#[tokio::test]
async fn unavailable_thresholds_fall_back_to_type_defaults() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.record_ago("t1", 1, 30.0);
    source
        .fail_thresholds
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let engine = engine(source);
    assert_ok!(engine.refresh_now().await);

    // Type default optimal band is 18..=25.
    let health = engine.get_sensor("t1").unwrap();
    assert_eq!(health.status.status, SensorStatus::Warning);
    assert_eq!(health.thresholds.optimal_max, 25.0);
    assert_eq!(health.defaulted_thresholds.len(), 4);
}

#[tokio::test]
async fn legacy_threshold_names_are_honoured() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.set_thresholds(
        "t1",
        json!({ "min_critical": -5, "max_critical": "45", "min_warning": 10, "max_warning": 30 }),
    );
    source.record_ago("t1", 1, 28.0);

    let engine = engine(source);
    assert_ok!(engine.refresh_now().await);

    let health = engine.get_sensor("t1").unwrap();
    assert_eq!(health.status.status, SensorStatus::Normal);
    assert_eq!(health.thresholds.max, 45.0);
    assert!(health.defaulted_thresholds.is_empty());
}

#[tokio::test]
async fn out_of_order_cycle_is_discarded() {
    // ---
    let source = two_farms();
    let engine = engine(Arc::clone(&source));

    let older = assert_ok!(engine.fetch_cycle().await);
    tick().await;
    let newer = assert_ok!(engine.fetch_cycle().await);
    assert!(older.requested_at < newer.requested_at);
    let newest = newer.requested_at;

    assert!(matches!(engine.apply(newer.clone()), ApplyOutcome::Applied { .. }));
    assert_eq!(
        engine.apply(older.clone()),
        ApplyOutcome::Discarded {
            requested_at: older.requested_at,
            last_applied: newer.requested_at,
        }
    );
    assert!(matches!(engine.apply(newer), ApplyOutcome::Discarded { .. }));
    assert_eq!(engine.last_evaluated_at(), Some(newest));
}

#[tokio::test]
async fn cycle_order_survives_clock_stepping_back() {
    // ---
    let engine = engine(two_farms());

    let first = assert_ok!(engine.fetch_cycle().await);
    let mut second = assert_ok!(engine.fetch_cycle().await);
    assert!(first.sequence < second.sequence);
    second.requested_at = first.requested_at - Duration::minutes(10);

    assert!(matches!(engine.apply(first.clone()), ApplyOutcome::Applied { .. }));
    assert!(matches!(engine.apply(second.clone()), ApplyOutcome::Applied { .. }));
    assert_eq!(engine.last_evaluated_at(), Some(second.requested_at));
    assert!(matches!(engine.apply(first), ApplyOutcome::Discarded { .. }));
}

#[tokio::test]
async fn late_older_reading_from_another_sensor_is_picked_up() {
    // ---
    let source = MemorySource::new();
    for id in ["a", "b"] {
        source.add_sensor(id, "dev-1", "farm-a", "temperature");
        source.set_thresholds(id, temperature_thresholds());
    }
    let engine = engine(Arc::clone(&source));

    source.record_ago("a", 1, 21.0);
    assert_ok!(engine.refresh_now().await);
    assert_eq!(engine.get_status("b").map(|s| s.status), Some(SensorStatus::Offline));

    // Stored after a's reading, stamped before it.
    source.record_ago("b", 5, 22.0);
    tick().await;
    assert_ok!(engine.refresh_now().await);

    assert_eq!(engine.get_status("b").map(|s| s.status), Some(SensorStatus::Normal));
    assert_eq!(engine.get_status("a").map(|s| s.status), Some(SensorStatus::Normal));
    assert_eq!(engine.live_readings(), 2);
}

#[tokio::test]
async fn incremental_fetch_does_not_duplicate_readings() {
    // ---
    let source = two_farms();
    let engine = engine(Arc::clone(&source));

    assert_ok!(engine.refresh_now().await);
    let buffered = engine.live_readings();
    tick().await;
    assert_ok!(engine.refresh_now().await);

    assert_eq!(engine.live_readings(), buffered);
    assert_eq!(engine.get_sensor("t1").unwrap().average_value, Some(21.5));
}

#[tokio::test]
async fn anomalies_are_ordered_by_severity() {
    // ---
    let engine = engine(two_farms());
    assert_ok!(engine.refresh_now().await);

    let anomalies = engine.get_anomalies(&SensorFilter::default());
    let ids: Vec<&str> = anomalies.iter().map(|a| a.sensor_id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t2"]);
    assert_eq!(anomalies[0].threshold, 50.0);
    assert_eq!(anomalies[0].side, BreachSide::High);
    assert_eq!(anomalies[1].threshold, 25.0);

    let critical_only = SensorFilter {
        status: Some(SensorStatus::Critical),
        ..SensorFilter::default()
    };
    assert_eq!(engine.get_anomalies(&critical_only).len(), 1);
}

#[tokio::test]
async fn farm_scope_limits_population() {
    // ---
    let settings = EngineSettings {
        farm_scope: Some("farm-b".to_string()),
        ..EngineSettings::default()
    };
    let engine = HealthEngine::new(two_farms(), settings);
    assert_ok!(engine.refresh_now().await);

    let farms = engine.get_farm_groups(&SensorFilter::default());
    assert_eq!(farms.len(), 1);
    assert_eq!(farms[0].farm_id, "farm-b");
    assert_eq!(engine.get_status("t1"), None);
}

#[tokio::test]
async fn series_merges_history_with_live_buffer() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.record_ago("t1", 200, 15.0);
    source.record_ago("t1", 90, 18.0);
    source.record_ago("t1", 30, 21.0);

    let engine = engine(Arc::clone(&source));
    assert_ok!(engine.refresh_now().await);

    let report = engine.get_series("t1", TimeWindow::Last6h).await.unwrap();
    assert!(report.series.complete);
    assert!(report.series.warning.is_none());
    let values: Vec<f64> = report.series.points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![15.0, 18.0, 21.0]);
    assert!(report.series.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    // Default delta interval is one hour: 21 now against 18 ninety minutes ago.
    assert_eq!(report.delta.change(), Some(3.0));

    let short = engine.get_series("t1", TimeWindow::Last15m).await.unwrap();
    assert!(short.series.points.is_empty());
    assert_eq!(short.delta, Delta::Unavailable);

    assert!(engine.get_series("unknown", TimeWindow::Last1h).await.is_none());
}

#[tokio::test]
async fn series_degrades_to_live_data_when_history_fails() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.record_ago("t1", 40, 19.0);
    source.record_ago("t1", 10, 20.0);

    let engine = engine(Arc::clone(&source));
    assert_ok!(engine.refresh_now().await);

    source
        .fail_readings
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let report = engine.get_series("t1", TimeWindow::Last1h).await.unwrap();

    assert!(!report.series.complete);
    assert!(report.series.warning.is_some());
    assert_eq!(report.series.points.len(), 2);
}

#[tokio::test]
async fn custom_window_is_bounded_on_both_sides() {
    // ---
    let source = MemorySource::new();
    source.add_sensor("t1", "dev-1", "farm-a", "temperature");
    source.record_ago("t1", 300, 10.0);
    source.record_ago("t1", 180, 12.0);
    source.record_ago("t1", 5, 14.0);

    let engine = engine(Arc::clone(&source));
    assert_ok!(engine.refresh_now().await);

    let now = Utc::now();
    let window = TimeWindow::Custom {
        start: now - Duration::hours(4),
        end: now - Duration::hours(1),
    };
    let report = engine.get_series("t1", window).await.unwrap();
    let values: Vec<f64> = report.series.points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![12.0]);
}
