//! Criterion benchmarks for `dw-math`.
//!
//! The Grubbs critical value runs a bisection over the t CDF on every
//! evaluation, so it is the hottest kernel in the statistical detector.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dw_math::{grubbs_critical_value, percentile_sorted, sorted_finite, student_t_cdf};

fn bench_grubbs(c: &mut Criterion) {
    let mut group = c.benchmark_group("grubbs");
    for n in [8usize, 50, 500] {
        group.bench_with_input(BenchmarkId::new("critical_value", n), &n, |b, &n| {
            b.iter(|| black_box(grubbs_critical_value(black_box(n), 0.05)));
        });
    }
    group.bench_function("t_cdf", |b| {
        b.iter(|| black_box(student_t_cdf(black_box(2.7), black_box(18.0))));
    });
    group.finish();
}

fn bench_percentiles(c: &mut Criterion) {
    let raw: Vec<f64> = (0..10_000).map(|i| ((i * 7919) % 10_007) as f64).collect();
    c.bench_function("sorted_finite_10k", |b| {
        b.iter(|| black_box(sorted_finite(black_box(&raw))));
    });
    let sorted = sorted_finite(&raw);
    c.bench_function("percentile_p95", |b| {
        b.iter(|| black_box(percentile_sorted(black_box(&sorted), 0.95)));
    });
}

criterion_group!(benches, bench_grubbs, bench_percentiles);
criterion_main!(benches);
