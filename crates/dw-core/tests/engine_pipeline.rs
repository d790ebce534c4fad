//! End-to-end tests of the detection engine over an in-memory store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dw_common::{AnomalyId, Error, MetricKind, SeriesKey, TimeWindow};
use dw_config::EngineConfig;
use dw_core::detect::{DetectionOutcome, Severity};
use dw_core::engine::AnomalyEngine;
use dw_core::ingest::RawPoint;
use dw_core::ml::TrainOutcome;
use dw_core::store::{AnomalyFilter, Store};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn engine(ml: bool) -> AnomalyEngine {
    let mut cfg = EngineConfig::default();
    cfg.ml.enabled = ml;
    AnomalyEngine::new(cfg, Store::open_in_memory().unwrap()).unwrap()
}

/// `n` points one minute apart ending a minute before `t0`, cycling
/// through 48..=52.
fn warm_up(engine: &mut AnomalyEngine, name: &str, n: i64) -> Vec<DetectionOutcome> {
    let start = t0() - Duration::minutes(n);
    (0..n)
        .map(|i| {
            let raw = RawPoint::new(name, 48.0 + (i % 5) as f64).at(start + Duration::minutes(i));
            engine.process(raw, t0() + Duration::minutes(1)).unwrap()
        })
        .collect()
}

fn spike(engine: &mut AnomalyEngine, name: &str, value: f64, at: DateTime<Utc>) -> DetectionOutcome {
    engine
        .process(RawPoint::new(name, value).at(at), at + Duration::seconds(1))
        .unwrap()
}

#[test]
fn learns_then_scores() {
    let mut engine = engine(false);
    let outcomes = warm_up(&mut engine, "orders.count", 60);

    for (i, outcome) in outcomes.iter().take(10).enumerate() {
        match outcome {
            DetectionOutcome::Learning { observations, .. } => assert_eq!(*observations, i + 1),
            other => panic!("point {} should be learning, got {:?}", i, other),
        }
    }
    assert!(outcomes[10..]
        .iter()
        .all(|o| matches!(o, DetectionOutcome::Normal { .. })));

    let normal = spike(&mut engine, "orders.count", 50.0, t0());
    match normal {
        DetectionOutcome::Normal { votes, score, .. } => {
            assert_eq!(votes, 0);
            assert!(score < 0.6);
        }
        other => panic!("expected normal, got {:?}", other),
    }
}

#[test]
fn spike_is_recorded_as_anomaly() {
    let mut engine = engine(false);
    warm_up(&mut engine, "orders.count", 60);

    let outcome = spike(&mut engine, "orders.count", 500.0, t0());
    let record = outcome.anomaly().expect("spike should be anomalous").clone();
    assert_eq!(record.series, SeriesKey::new("orders.count", "default"));
    assert_eq!(record.kind, MetricKind::Generic);
    assert!(record.severity >= Severity::High);
    assert!(record.methods.iter().any(|m| m == "z_score"));
    assert!(record.methods.iter().any(|m| m == "iqr"));
    assert!((record.expected - 50.0).abs() < 1e-9);
    assert!(record.ml.is_none());
    assert_eq!(record.features.as_ref().map(|f| f.len()), Some(6));

    let listed = engine.list_anomalies(&AnomalyFilter::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);

    let none = engine
        .list_anomalies(&AnomalyFilter {
            metric: Some("other.metric".to_string()),
            ..AnomalyFilter::default()
        })
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn labels_round_trip_through_the_store() {
    let mut engine = engine(false);
    warm_up(&mut engine, "orders.count", 40);
    let record = spike(&mut engine, "orders.count", 900.0, t0())
        .anomaly()
        .cloned()
        .expect("anomalous");

    let labeled = engine.label_anomaly(&record.id, false).unwrap();
    assert_eq!(labeled.label, Some(false));
    assert_eq!(engine.get_anomaly(&record.id).unwrap().label, Some(false));

    let unlabeled = engine
        .list_anomalies(&AnomalyFilter {
            unlabeled_only: true,
            ..AnomalyFilter::default()
        })
        .unwrap();
    assert!(unlabeled.is_empty());

    let missing = AnomalyId::new();
    assert!(matches!(
        engine.label_anomaly(&missing, true),
        Err(Error::AnomalyNotFound { .. })
    ));
    assert!(matches!(
        engine.get_anomaly(&missing),
        Err(Error::AnomalyNotFound { .. })
    ));
}

#[test]
fn series_are_independent() {
    let mut engine = engine(false);
    warm_up(&mut engine, "orders.count", 30);
    let other = engine
        .process(
            RawPoint::new("orders.count", 500.0).with_source("eu-1").at(t0()),
            t0() + Duration::minutes(1),
        )
        .unwrap();
    assert!(matches!(other, DetectionOutcome::Learning { observations: 1, .. }));
}

#[test]
fn batch_reports_rejections_without_failing() {
    let mut engine = engine(false);
    let points = vec![
        RawPoint::new("orders.count", 1.0).at(t0()),
        RawPoint::new("bad name", 1.0).at(t0()),
        RawPoint::new("orders.count", f64::NAN).at(t0()),
        RawPoint::new("orders.count", 2.0).at(t0() + Duration::seconds(10)),
    ];
    let report = engine.process_batch(points, t0() + Duration::minutes(1)).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.learning, 2);
    assert_eq!(report.rejected.len(), 2);
    assert_eq!(report.rejected[0].index, 1);
    assert_eq!(report.rejected[1].index, 2);

    let stored = engine
        .store_batch(vec![RawPoint::new("queue.depth", 3.0).at(t0())], t0())
        .unwrap();
    assert_eq!(stored.processed, 1);
    assert_eq!(engine.stats().unwrap().store.points, 3);
}

#[test]
fn invalid_point_is_an_ingestion_error() {
    let mut engine = engine(false);
    let err = engine
        .process(RawPoint::new("x", 1.0).at(t0() + Duration::hours(1)), t0())
        .unwrap_err();
    assert_eq!(err.category(), dw_common::ErrorCategory::Ingestion);
}

#[test]
fn models_train_once_enough_history_exists() {
    let mut engine = engine(true);
    warm_up(&mut engine, "orders.count", 150);

    let stats = engine.stats().unwrap();
    assert!(stats
        .models
        .iter()
        .any(|m| m.kind == MetricKind::Generic && m.model_type == "isolation_forest"));

    let record = spike(&mut engine, "orders.count", 500.0, t0())
        .anomaly()
        .cloned()
        .expect("anomalous");
    let ml = record.ml.expect("ml score present once a model exists");
    assert!(ml.isolation_score > 0.0);
    assert!(ml.supervised_probability.is_none());

    let outcomes = engine.train(Some(MetricKind::Generic), t0()).unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [TrainOutcome::Trained { kind: MetricKind::Generic, supervised: false, .. }]
    ));

    let skipped = engine.train(Some(MetricKind::Security), t0()).unwrap();
    assert!(matches!(skipped.as_slice(), [TrainOutcome::Skipped { .. }]));
}

#[test]
fn models_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dw.db");
    let mut cfg = EngineConfig::default();
    cfg.storage.db_path = Some(path.clone());
    {
        let mut engine = AnomalyEngine::open(cfg.clone()).unwrap();
        warm_up(&mut engine, "orders.count", 120);
        assert!(!engine.stats().unwrap().models.is_empty());
    }
    let mut engine = AnomalyEngine::open(cfg).unwrap();
    let record = spike(&mut engine, "orders.count", 500.0, t0())
        .anomaly()
        .cloned()
        .expect("anomalous");
    assert!(record.ml.is_some());
}

#[test]
fn exported_baselines_warm_a_fresh_engine() {
    let mut source = engine(false);
    warm_up(&mut source, "orders.count", 60);
    source.refresh_baselines(None, t0()).unwrap();
    let json = source.export_baselines("test-origin", t0()).unwrap();

    let mut fresh = engine(false);
    assert!(fresh.export_baselines("empty", t0()).is_err());
    let imported = fresh.import_baselines(&json, t0()).unwrap();
    assert!(imported >= 2);
    assert_eq!(
        fresh.stats().unwrap().baseline_metadata.imported_from.as_deref(),
        Some("test-origin")
    );

    // No history of its own, yet the imported baseline scores immediately.
    let outcome = spike(&mut fresh, "orders.count", 500.0, t0() + Duration::minutes(1));
    assert!(outcome.is_anomalous());
}

#[test]
fn reset_returns_series_to_learning() {
    let mut engine = engine(false);
    warm_up(&mut engine, "orders.count", 30);
    let series = SeriesKey::new("orders.count", "default");
    assert!(!engine.baselines(Some(&series)).unwrap().is_empty());

    let removed = engine.reset_baselines(Some(&series), t0()).unwrap();
    assert!(removed >= 1);
    assert!(engine.baselines(Some(&series)).unwrap().is_empty());
    assert_eq!(engine.stats().unwrap().baseline_metadata.reset_count, 1);
}

#[test]
fn maintenance_prunes_expired_points() {
    let mut cfg = EngineConfig::default();
    cfg.ml.enabled = false;
    cfg.storage.retention_secs = 3_600;
    let mut engine = AnomalyEngine::new(cfg, Store::open_in_memory().unwrap()).unwrap();
    warm_up(&mut engine, "orders.count", 90);

    let report = engine.maintenance(t0()).unwrap();
    assert_eq!(report.points_pruned, 30);
    assert_eq!(report.models_trained(), 0);
    assert_eq!(engine.stats().unwrap().store.points, 60);
}

#[test]
fn stale_baseline_is_refreshed_while_processing() {
    let mut cfg = EngineConfig::default();
    cfg.ml.enabled = false;
    cfg.baseline.refresh_interval_secs = 3_600;
    let mut engine = AnomalyEngine::new(cfg, Store::open_in_memory().unwrap()).unwrap();
    let series = SeriesKey::new("orders.count", "default");
    let feed = |engine: &mut AnomalyEngine, minute: i64| {
        let at = t0() + Duration::minutes(minute);
        engine
            .process(RawPoint::new("orders.count", 48.0 + (minute % 5) as f64).at(at), at + Duration::seconds(1))
            .unwrap()
    };
    let hour_baseline = |engine: &mut AnomalyEngine| {
        engine
            .baselines(Some(&series))
            .unwrap()
            .into_iter()
            .map(|(_, b)| b)
            .find(|b| b.window == TimeWindow::Hour)
            .expect("hour baseline")
    };

    for minute in 0..30 {
        feed(&mut engine, minute);
    }
    let fitted = hour_baseline(&mut engine);
    assert_eq!(fitted.computed_at, t0() + Duration::minutes(10));
    assert_eq!(fitted.n, 10);

    feed(&mut engine, 75);
    let refreshed = hour_baseline(&mut engine);
    assert_eq!(refreshed.computed_at, t0() + Duration::minutes(75));
    assert_eq!(refreshed.n, 15);
}

#[test]
fn extreme_durations_saturate_instead_of_panicking() {
    let mut cfg = EngineConfig::default();
    cfg.ml.enabled = false;
    cfg.ingestion.max_future_skew_secs = i64::MAX;
    cfg.ingestion.max_age_secs = i64::MAX;
    cfg.baseline.refresh_interval_secs = i64::MAX;
    cfg.ml.retrain_interval_secs = i64::MAX;
    cfg.ml.training_lookback_secs = i64::MAX;
    cfg.storage.retention_secs = i64::MAX;
    let mut engine = AnomalyEngine::new(cfg, Store::open_in_memory().unwrap()).unwrap();
    warm_up(&mut engine, "orders.count", 30);

    assert!(spike(&mut engine, "orders.count", 500.0, t0()).anomaly().is_some());
    let report = engine.maintenance(t0()).unwrap();
    assert_eq!(report.points_pruned, 0);
    assert_eq!(engine.stats().unwrap().store.points, 31);
}
