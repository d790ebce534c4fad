//! Hour-of-day and day-of-week seasonality.
//!
//! Points are bucketed by UTC hour (24 buckets) and weekday (7 buckets,
//! Monday first). A pattern's strength is η², the share of variance
//! explained by the bucketing, computed only over buckets holding at least
//! `min_bucket_samples` points.

use chrono::{DateTime, Datelike, Timelike, Utc};
use dw_config::SeasonalSettings;
use dw_math::{eta_squared, mean, sample_std_dev};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalPattern {
    #[default]
    None,
    Hourly,
    Daily,
    HourlyAndDaily,
}

impl SeasonalPattern {
    pub fn has_hourly(&self) -> bool {
        matches!(self, SeasonalPattern::Hourly | SeasonalPattern::HourlyAndDaily)
    }

    pub fn has_daily(&self) -> bool {
        matches!(self, SeasonalPattern::Daily | SeasonalPattern::HourlyAndDaily)
    }

    fn from_flags(hourly: bool, daily: bool) -> Self {
        match (hourly, daily) {
            (true, true) => SeasonalPattern::HourlyAndDaily,
            (true, false) => SeasonalPattern::Hourly,
            (false, true) => SeasonalPattern::Daily,
            (false, false) => SeasonalPattern::None,
        }
    }
}

/// Which bucketing a seasonal lookup used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalComponent {
    HourOfDay,
    DayOfWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalProfile {
    pub pattern: SeasonalPattern,
    /// 24 buckets, index = UTC hour.
    pub hourly: Vec<BucketStats>,
    /// 7 buckets, index = days from Monday.
    pub daily: Vec<BucketStats>,
    pub hourly_strength: f64,
    pub daily_strength: f64,
    pub min_bucket_samples: usize,
}

impl SeasonalProfile {
    pub fn hour_bucket(&self, ts: DateTime<Utc>) -> Option<&BucketStats> {
        self.hourly.get(ts.hour() as usize)
    }

    pub fn weekday_bucket(&self, ts: DateTime<Utc>) -> Option<&BucketStats> {
        self.daily
            .get(ts.weekday().num_days_from_monday() as usize)
    }

    /// Bucket of the strongest detected component for `ts`, if it is
    /// populated enough to compare against.
    pub fn expected_at(&self, ts: DateTime<Utc>) -> Option<(SeasonalComponent, BucketStats)> {
        let hourly = self
            .pattern
            .has_hourly()
            .then(|| self.hour_bucket(ts).map(|b| (SeasonalComponent::HourOfDay, *b, self.hourly_strength)))
            .flatten();
        let daily = self
            .pattern
            .has_daily()
            .then(|| self.weekday_bucket(ts).map(|b| (SeasonalComponent::DayOfWeek, *b, self.daily_strength)))
            .flatten();

        [hourly, daily]
            .into_iter()
            .flatten()
            .filter(|(_, b, _)| b.n >= self.min_bucket_samples)
            .max_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(c, b, _)| (c, b))
    }
}

fn bucket_stats(values: &[f64]) -> BucketStats {
    BucketStats {
        n: values.len(),
        mean: mean(values).unwrap_or(0.0),
        std_dev: sample_std_dev(values).unwrap_or(0.0),
    }
}

/// η² over buckets with enough samples, and how many such buckets exist.
fn strength(buckets: &[Vec<f64>], min_samples: usize) -> (f64, usize) {
    let populated: Vec<&Vec<f64>> = buckets.iter().filter(|b| b.len() >= min_samples).collect();
    if populated.len() < 2 {
        return (0.0, populated.len());
    }
    let pooled: Vec<f64> = populated.iter().flat_map(|b| b.iter().copied()).collect();
    let Some(grand) = mean(&pooled) else {
        return (0.0, populated.len());
    };
    let total_ss: f64 = pooled.iter().map(|v| (v - grand).powi(2)).sum();
    let groups: Vec<(usize, f64)> = populated
        .iter()
        .map(|b| (b.len(), mean(b).unwrap_or(grand)))
        .collect();
    (eta_squared(&groups, grand, total_ss), populated.len())
}

/// Build a seasonal profile from timestamped values.
pub fn detect_seasonality(points: &[(DateTime<Utc>, f64)], cfg: &SeasonalSettings) -> SeasonalProfile {
    let mut hourly: Vec<Vec<f64>> = vec![Vec::new(); 24];
    let mut daily: Vec<Vec<f64>> = vec![Vec::new(); 7];
    for (ts, v) in points.iter().filter(|(_, v)| v.is_finite()) {
        hourly[ts.hour() as usize].push(*v);
        daily[ts.weekday().num_days_from_monday() as usize].push(*v);
    }

    let (hourly_strength, hourly_populated) = strength(&hourly, cfg.min_bucket_samples);
    let (daily_strength, daily_populated) = strength(&daily, cfg.min_bucket_samples);

    let hourly_detected =
        hourly_populated >= cfg.min_hourly_buckets && hourly_strength >= cfg.strength_threshold;
    let daily_detected =
        daily_populated >= cfg.min_daily_buckets && daily_strength >= cfg.strength_threshold;

    SeasonalProfile {
        pattern: SeasonalPattern::from_flags(hourly_detected, daily_detected),
        hourly: hourly.iter().map(|b| bucket_stats(b)).collect(),
        daily: daily.iter().map(|b| bucket_stats(b)).collect(),
        hourly_strength,
        daily_strength,
        min_bucket_samples: cfg.min_bucket_samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        // A Monday.
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    fn series(hours: i64, f: impl Fn(DateTime<Utc>, i64) -> f64) -> Vec<(DateTime<Utc>, f64)> {
        (0..hours * 4)
            .map(|i| {
                let ts = start() + Duration::minutes(15 * i);
                (ts, f(ts, i))
            })
            .collect()
    }

    #[test]
    fn strong_daily_cycle_is_hourly_pattern() {
        // Business-hours load: 100 during 09-17 UTC, 10 otherwise, small jitter.
        let pts = series(72, |ts, i| {
            let base = if (9..17).contains(&ts.hour()) { 100.0 } else { 10.0 };
            base + (i % 3) as f64
        });
        let p = detect_seasonality(&pts, &SeasonalSettings::default());
        assert!(p.pattern.has_hourly(), "{:?}", p.pattern);
        assert!(p.hourly_strength > 0.9);
        // Only 3 weekdays observed: below the daily bucket minimum.
        assert!(!p.pattern.has_daily());

        let noon = start() + Duration::hours(12);
        let (component, bucket) = p.expected_at(noon).unwrap();
        assert_eq!(component, SeasonalComponent::HourOfDay);
        assert!((bucket.mean - 101.0).abs() < 1.0);
    }

    #[test]
    fn flat_noise_has_no_pattern() {
        let pts = series(24 * 8, |_, i| 50.0 + ((i * 7919) % 11) as f64);
        let p = detect_seasonality(&pts, &SeasonalSettings::default());
        assert_eq!(p.pattern, SeasonalPattern::None);
        assert!(p.expected_at(start()).is_none());
    }

    #[test]
    fn weekday_pattern_detected() {
        // Weekends quiet, weekdays busy; 8 days covers all 7 buckets.
        let pts = series(24 * 8, |ts, i| {
            let weekend = ts.weekday().num_days_from_monday() >= 5;
            (if weekend { 5.0 } else { 80.0 }) + (i % 2) as f64
        });
        let p = detect_seasonality(&pts, &SeasonalSettings::default());
        assert!(p.pattern.has_daily(), "{:?}", p);
        assert!(p.daily_strength > 0.9);
    }

    #[test]
    fn sparse_buckets_are_ignored() {
        let pts: Vec<_> = (0..5).map(|h| (start() + Duration::hours(h), h as f64)).collect();
        let p = detect_seasonality(&pts, &SeasonalSettings::default());
        assert_eq!(p.pattern, SeasonalPattern::None);
        assert_eq!(p.hourly_strength, 0.0);
        assert_eq!(p.hourly.len(), 24);
        assert_eq!(p.daily.len(), 7);
    }
}
