//! Feature extraction for the ML models.
//!
//! Every feature is expressed in baseline-scale units so one model can
//! serve all series of a metric kind regardless of their magnitude.

use chrono::{DateTime, Timelike, Utc};
use dw_math::mean;

use crate::baseline::BaselineSummary;

pub const N_FEATURES: usize = 6;

pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "robust_z",
    "delta_prev",
    "recent_mean_deviation",
    "percentile_position",
    "hour_sin",
    "hour_cos",
];

/// Points averaged for the recent-mean feature.
const RECENT_WINDOW: usize = 5;

/// Features are clamped to this magnitude so one extreme value cannot
/// dominate tree splits.
const FEATURE_CLAMP: f64 = 50.0;

/// σ-equivalent of the normal MAD.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Width of [p5, p95] in σ for normal data.
const P5_P95_SIGMAS: f64 = 3.29;

/// Spread used to normalize deviations: scaled MAD, else the standard
/// deviation, else the p5..p95 width, else 1.
pub fn scale(b: &BaselineSummary) -> f64 {
    [
        MAD_TO_SIGMA * b.mad,
        b.std_dev,
        (b.p95() - b.p5()) / P5_P95_SIGMAS,
    ]
    .into_iter()
    .find(|s| s.is_finite() && *s > 1e-12)
    .unwrap_or(1.0)
}

/// Feature vector for `value` at `ts`. `previous` holds the series values
/// immediately before the point, oldest first.
pub fn extract(
    value: f64,
    ts: DateTime<Utc>,
    previous: &[f64],
    baseline: &BaselineSummary,
) -> [f64; N_FEATURES] {
    let s = scale(baseline);

    let robust_z = (value - baseline.median) / s;
    let delta_prev = previous.last().map(|p| (value - p) / s).unwrap_or(0.0);
    let tail = &previous[previous.len().saturating_sub(RECENT_WINDOW)..];
    let recent_dev = mean(tail).map(|m| (value - m) / s).unwrap_or(0.0);

    let width = baseline.p95() - baseline.p5();
    let position = if width > 1e-12 {
        2.0 * (value - baseline.p5()) / width - 1.0
    } else if (value - baseline.median).abs() <= 1e-12 {
        0.0
    } else {
        2.0 * (value - baseline.median).signum()
    };

    let hour = f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0;
    let angle = 2.0 * std::f64::consts::PI * hour / 24.0;

    [robust_z, delta_prev, recent_dev, position, angle.sin(), angle.cos()]
        .map(|f| if f.is_finite() { f.clamp(-FEATURE_CLAMP, FEATURE_CLAMP) } else { 0.0 })
}

/// Feature rows for every point of an ascending history.
pub fn extract_history(points: &[(DateTime<Utc>, f64)], baseline: &BaselineSummary) -> Vec<Vec<f64>> {
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    points
        .iter()
        .enumerate()
        .map(|(i, (ts, v))| {
            let from = i.saturating_sub(RECENT_WINDOW);
            extract(*v, *ts, &values[from..i], baseline).to_vec()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::fit_baseline;
    use chrono::TimeZone;
    use dw_common::TimeWindow;
    use dw_config::BaselineSettings;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, hour, 0, 0).unwrap()
    }

    fn baseline() -> BaselineSummary {
        let values: Vec<f64> = (1..=21).map(f64::from).collect();
        fit_baseline(&values, TimeWindow::Day, ts(0), &BaselineSettings::default()).unwrap()
    }

    #[test]
    fn scale_prefers_mad() {
        let b = baseline();
        assert!((scale(&b) - 1.4826 * b.mad).abs() < 1e-12);
        let flat = fit_baseline(&[3.0; 12], TimeWindow::Day, ts(0), &BaselineSettings::default())
            .unwrap();
        assert_eq!(scale(&flat), 1.0);
    }

    #[test]
    fn features_at_median() {
        let b = baseline();
        let f = extract(b.median, ts(6), &[], &b);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[1], 0.0);
        assert_eq!(f[2], 0.0);
        assert!(f[3].abs() < 1e-9);
        assert!((f[4] - 1.0).abs() < 1e-12);
        assert!(f[5].abs() < 1e-12);
    }

    #[test]
    fn recent_features_use_history() {
        let b = baseline();
        let s = scale(&b);
        let prev = [1.0, 2.0, 3.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        let f = extract(20.0, ts(0), &prev, &b);
        assert!((f[1] - 10.0 / s).abs() < 1e-12);
        assert!((f[2] - 10.0 / s).abs() < 1e-12);
    }

    #[test]
    fn features_are_clamped() {
        let b = baseline();
        let f = extract(1e12, ts(0), &[0.0], &b);
        assert_eq!(f[0], 50.0);
        assert_eq!(f[1], 50.0);
        assert!(f.iter().all(|x| x.abs() <= 50.0));
    }

    #[test]
    fn history_rows_match_points() {
        let b = baseline();
        let pts: Vec<_> = (0..8).map(|h| (ts(h), h as f64)).collect();
        let rows = extract_history(&pts, &b);
        assert_eq!(rows.len(), 8);
        assert!(rows.iter().all(|r| r.len() == N_FEATURES));
        assert_eq!(rows[0][1], 0.0);
    }
}
