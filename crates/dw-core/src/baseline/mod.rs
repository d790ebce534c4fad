//! Rolling per-series baselines.
//!
//! A baseline summarizes one series over one trailing window: moments,
//! robust spread, percentiles and (for day/week windows) a seasonal
//! profile. Baselines are fitted from stored points and persisted so a
//! restarted engine resumes scoring without relearning.

mod manager;
pub mod seasonal;

pub use manager::{BaselineExport, BaselineManager, BaselineMetadata, SeriesBaselines};
pub use seasonal::{
    detect_seasonality, BucketStats, SeasonalComponent, SeasonalPattern, SeasonalProfile,
};

use chrono::{DateTime, Utc};
use dw_common::{TimeWindow, SCHEMA_VERSION};
use dw_config::BaselineSettings;
use dw_math::{mean, median_abs_deviation, percentile_sorted, sample_std_dev, sorted_finite, Quartiles};
use serde::{Deserialize, Serialize};

/// Percentile levels stored on every baseline, in order.
pub const PERCENTILE_LEVELS: [f64; 6] = [0.05, 0.25, 0.5, 0.75, 0.95, 0.99];

/// Summary statistics for one series over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSummary {
    pub window: TimeWindow,
    /// Number of observations used.
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    pub median: f64,
    /// Raw (unscaled) median absolute deviation.
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    /// p5, p25, p50, p75, p95, p99.
    pub percentiles: [f64; 6],
    /// Fewer observations than the cold-start threshold.
    pub cold_start: bool,
    pub computed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seasonal: Option<SeasonalProfile>,
    pub schema_version: u32,
}

impl BaselineSummary {
    pub fn p5(&self) -> f64 {
        self.percentiles[0]
    }
    pub fn p25(&self) -> f64 {
        self.percentiles[1]
    }
    pub fn p75(&self) -> f64 {
        self.percentiles[3]
    }
    pub fn p95(&self) -> f64 {
        self.percentiles[4]
    }
    pub fn p99(&self) -> f64 {
        self.percentiles[5]
    }

    pub fn quartiles(&self) -> Quartiles {
        Quartiles {
            q1: self.p25(),
            median: self.median,
            q3: self.p75(),
        }
    }

    /// Enough observations to score against.
    pub fn is_warm(&self, min_observations: usize) -> bool {
        self.n >= min_observations
    }

    pub fn has_seasonality(&self) -> bool {
        self.seasonal
            .as_ref()
            .is_some_and(|s| s.pattern != SeasonalPattern::None)
    }
}

/// Fit a baseline from raw values.
///
/// Non-finite values are ignored. Returns `None` when fewer than
/// `min_observations` finite values remain.
pub fn fit_baseline(
    values: &[f64],
    window: TimeWindow,
    computed_at: DateTime<Utc>,
    cfg: &BaselineSettings,
) -> Option<BaselineSummary> {
    let sorted = sorted_finite(values);
    let n = sorted.len();
    if n < cfg.min_observations.max(2) {
        return None;
    }

    let mean = mean(&sorted)?;
    let std_dev = sample_std_dev(&sorted)?;
    let median = percentile_sorted(&sorted, 0.5);
    let mad = median_abs_deviation(&sorted, median);
    let percentiles = PERCENTILE_LEVELS.map(|p| percentile_sorted(&sorted, p));

    Some(BaselineSummary {
        window,
        n,
        mean,
        std_dev,
        median,
        mad,
        min: sorted[0],
        max: sorted[n - 1],
        percentiles,
        cold_start: n < cfg.cold_start_threshold,
        computed_at,
        seasonal: None,
        schema_version: SCHEMA_VERSION,
    })
}

/// Fit a baseline and, when the window supports it, a seasonal profile.
pub fn fit_with_seasonality(
    points: &[(DateTime<Utc>, f64)],
    window: TimeWindow,
    computed_at: DateTime<Utc>,
    cfg: &BaselineSettings,
) -> Option<BaselineSummary> {
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let mut summary = fit_baseline(&values, window, computed_at, cfg)?;
    if cfg.seasonal.enabled && window.supports_seasonality() {
        summary.seasonal = Some(detect_seasonality(points, &cfg.seasonal));
    }
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn too_few_observations() {
        let cfg = BaselineSettings::default();
        let values: Vec<f64> = (0..9).map(f64::from).collect();
        assert!(fit_baseline(&values, TimeWindow::Hour, now(), &cfg).is_none());
    }

    #[test]
    fn ignores_non_finite_values() {
        let cfg = BaselineSettings::default();
        let mut values: Vec<f64> = (1..=10).map(f64::from).collect();
        values.push(f64::NAN);
        values.push(f64::INFINITY);
        let b = fit_baseline(&values, TimeWindow::Hour, now(), &cfg).unwrap();
        assert_eq!(b.n, 10);
        assert_eq!(b.min, 1.0);
        assert_eq!(b.max, 10.0);
    }

    #[test]
    fn summary_statistics() {
        let cfg = BaselineSettings::default();
        let values: Vec<f64> = (1..=11).map(f64::from).collect();
        let b = fit_baseline(&values, TimeWindow::Day, now(), &cfg).unwrap();
        assert_eq!(b.n, 11);
        assert!((b.mean - 6.0).abs() < 1e-12);
        assert!((b.std_dev - 11.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(b.median, 6.0);
        assert_eq!(b.mad, 3.0);
        assert!((b.p5() - 1.5).abs() < 1e-12);
        assert!((b.p95() - 10.5).abs() < 1e-12);
        assert!(b.cold_start);
        assert_eq!(b.schema_version, SCHEMA_VERSION);
        assert!(b.is_warm(10));
        assert!(!b.is_warm(12));
    }

    #[test]
    fn cold_start_clears_at_threshold() {
        let cfg = BaselineSettings::default();
        let values: Vec<f64> = (0..30).map(f64::from).collect();
        let b = fit_baseline(&values, TimeWindow::Week, now(), &cfg).unwrap();
        assert!(!b.cold_start);
    }

    #[test]
    fn hour_window_skips_seasonality() {
        let cfg = BaselineSettings::default();
        let pts: Vec<_> = (0..20).map(|i| (now(), i as f64)).collect();
        let hour = fit_with_seasonality(&pts, TimeWindow::Hour, now(), &cfg).unwrap();
        assert!(hour.seasonal.is_none());
        let day = fit_with_seasonality(&pts, TimeWindow::Day, now(), &cfg).unwrap();
        assert!(day.seasonal.is_some());
        assert!(!day.has_seasonality());
    }

    #[test]
    fn summary_json_roundtrip() {
        let cfg = BaselineSettings::default();
        let values: Vec<f64> = (0..40).map(|i| (i % 7) as f64).collect();
        let b = fit_baseline(&values, TimeWindow::Day, now(), &cfg).unwrap();
        let back: BaselineSummary = serde_json::from_str(&serde_json::to_string(&b).unwrap()).unwrap();
        assert_eq!(back, b);
    }
}
