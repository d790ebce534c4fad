//! Criterion benchmarks for the per-point scoring path.
//!
//! Baseline fitting runs once per refresh; `evaluate` and feature
//! extraction run for every ingested point.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dw_common::TimeWindow;
use dw_config::{BaselineSettings, StatisticalSettings};
use dw_core::baseline::{fit_baseline, fit_with_seasonality};
use dw_core::detect::statistical::evaluate;
use dw_core::ml::extract;

fn series(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + ((i * 7919) % 101) as f64 / 10.0 - 5.0)
        .collect()
}

fn bench_fit(c: &mut Criterion) {
    let cfg = BaselineSettings::default();
    let now = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap();
    let mut group = c.benchmark_group("fit_baseline");
    for n in [100usize, 1_000, 10_000] {
        let values = series(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, v| {
            b.iter(|| black_box(fit_baseline(black_box(v), TimeWindow::Day, now, &cfg)));
        });
    }
    group.finish();

    let points: Vec<_> = series(7 * 24 * 12)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (now - Duration::minutes(5 * i as i64), v))
        .collect();
    c.bench_function("fit_with_seasonality_week", |b| {
        b.iter(|| black_box(fit_with_seasonality(black_box(&points), TimeWindow::Week, now, &cfg)));
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap();
    let values = series(1_000);
    let baseline = fit_baseline(&values, TimeWindow::Day, now, &BaselineSettings::default())
        .expect("baseline fits");
    let recent = &values[values.len() - 50..];
    let cfg = StatisticalSettings::default();

    c.bench_function("evaluate_normal", |b| {
        b.iter(|| black_box(evaluate(black_box(101.0), now, &baseline, None, recent, &cfg)));
    });
    c.bench_function("evaluate_outlier", |b| {
        b.iter(|| black_box(evaluate(black_box(180.0), now, &baseline, None, recent, &cfg)));
    });
    c.bench_function("extract_features", |b| {
        b.iter(|| black_box(extract(black_box(180.0), now, recent, &baseline)));
    });
}

criterion_group!(benches, bench_fit, bench_evaluate);
criterion_main!(benches);
