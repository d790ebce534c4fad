//! Outlier tests against a fitted baseline.
//!
//! Every test reports a statistic, the threshold it is compared to, and a
//! score `r / (1 + r)` with `r = statistic / threshold`, so a statistic
//! exactly at its threshold scores 0.5. A test that cannot say anything
//! (zero spread with the value at the center, too few samples) is marked
//! inconclusive and does not vote.

use chrono::{DateTime, Utc};
use dw_config::StatisticalSettings;
use dw_math::{grubbs_critical_value, mean, normal_two_sided_p, sample_std_dev, student_t_cdf};
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineSummary, SeasonalComponent, SeasonalProfile};

/// Iglewicz–Hoaglin constant relating MAD to σ for normal data.
const MODIFIED_Z_FACTOR: f64 = 0.6745;

/// Relative tolerance under which a spread counts as zero.
const SPREAD_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    ZScore,
    ModifiedZScore,
    Iqr,
    Grubbs,
    Seasonal,
}

impl TestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::ZScore => "z_score",
            TestKind::ModifiedZScore => "modified_z_score",
            TestKind::Iqr => "iqr",
            TestKind::Grubbs => "grubbs",
            TestKind::Seasonal => "seasonal",
        }
    }
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON has no infinity; non-finite statistics are written as strings.
mod lenient_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("nan")
        } else if *v > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Num(v) => Ok(v),
            Repr::Text(t) => match t.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!("invalid float {:?}", other))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: TestKind,
    #[serde(with = "lenient_f64")]
    pub statistic: f64,
    pub threshold: f64,
    pub score: f64,
    pub is_outlier: bool,
    pub conclusive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TestOutcome {
    fn conclusive(test: TestKind, statistic: f64, threshold: f64, is_outlier: bool) -> Self {
        TestOutcome {
            test,
            statistic,
            threshold,
            score: test_score(statistic, threshold, is_outlier),
            is_outlier,
            conclusive: true,
            p_value: None,
            note: None,
        }
    }

    fn inconclusive(test: TestKind, threshold: f64, note: impl Into<String>) -> Self {
        TestOutcome {
            test,
            statistic: 0.0,
            threshold,
            score: 0.0,
            is_outlier: false,
            conclusive: false,
            p_value: None,
            note: Some(note.into()),
        }
    }

    fn with_p(mut self, p: f64) -> Self {
        self.p_value = Some(p.clamp(0.0, 1.0));
        self
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Aggregate of all tests for one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalReport {
    pub tests: Vec<TestOutcome>,
    /// Mean score over conclusive tests (0 when none are).
    pub score: f64,
    /// Conclusive tests that flagged the value.
    pub votes: usize,
    pub conclusive: usize,
    pub is_anomaly: bool,
}

impl StatisticalReport {
    /// Names of the tests that flagged the value.
    pub fn flagged(&self) -> impl Iterator<Item = TestKind> + '_ {
        self.tests.iter().filter(|t| t.is_outlier).map(|t| t.test)
    }

    pub fn outcome(&self, test: TestKind) -> Option<&TestOutcome> {
        self.tests.iter().find(|t| t.test == test)
    }

    /// Every conclusive test flagged the value.
    pub fn is_unanimous(&self) -> bool {
        self.conclusive > 0 && self.votes == self.conclusive
    }
}

/// `r / (1 + r)` with `r = statistic / threshold`; a zero threshold is a
/// pass/fail test.
pub fn test_score(statistic: f64, threshold: f64, is_outlier: bool) -> f64 {
    if threshold <= 0.0 {
        return if is_outlier { 1.0 } else { 0.0 };
    }
    let r = (statistic / threshold).max(0.0);
    if r.is_infinite() {
        1.0
    } else if r.is_nan() {
        0.0
    } else {
        r / (1.0 + r)
    }
}

fn tolerance(center: f64) -> f64 {
    SPREAD_EPSILON * center.abs().max(1.0)
}

/// Deviation test shared by z, modified z and seasonal: `|x - center| *
/// factor / spread` against `threshold`, with the zero-spread rule.
fn deviation_test(
    test: TestKind,
    x: f64,
    center: f64,
    spread: f64,
    factor: f64,
    threshold: f64,
) -> TestOutcome {
    let tol = tolerance(center);
    let diff = (x - center).abs();
    if spread <= tol {
        if diff > tol {
            return TestOutcome::conclusive(test, f64::INFINITY, threshold, true)
                .with_note("zero spread in baseline");
        }
        return TestOutcome::inconclusive(test, threshold, "zero spread and value at center");
    }
    let statistic = factor * diff / spread;
    TestOutcome::conclusive(test, statistic, threshold, statistic > threshold)
}

pub fn z_score_test(x: f64, baseline: &BaselineSummary, threshold: f64) -> TestOutcome {
    let outcome = deviation_test(TestKind::ZScore, x, baseline.mean, baseline.std_dev, 1.0, threshold);
    if outcome.conclusive {
        let p = if outcome.statistic.is_finite() {
            normal_two_sided_p(outcome.statistic)
        } else {
            0.0
        };
        outcome.with_p(p)
    } else {
        outcome
    }
}

pub fn modified_z_test(x: f64, baseline: &BaselineSummary, threshold: f64) -> TestOutcome {
    deviation_test(
        TestKind::ModifiedZScore,
        x,
        baseline.median,
        baseline.mad,
        MODIFIED_Z_FACTOR,
        threshold,
    )
}

/// Distance beyond the nearest Tukey fence, in IQR units.
pub fn iqr_test(x: f64, baseline: &BaselineSummary, k: f64) -> TestOutcome {
    let quartiles = baseline.quartiles();
    let iqr = quartiles.iqr();
    let tol = tolerance(quartiles.median);
    if iqr <= tol {
        let outside = x < quartiles.q1 - tol || x > quartiles.q3 + tol;
        let statistic = if outside { f64::INFINITY } else { 0.0 };
        return TestOutcome::conclusive(TestKind::Iqr, statistic, 0.0, outside)
            .with_note("zero interquartile range");
    }
    let (lo, hi) = quartiles.fences(k);
    let statistic = if x > hi {
        (x - hi) / iqr
    } else if x < lo {
        (lo - x) / iqr
    } else {
        0.0
    };
    TestOutcome::conclusive(TestKind::Iqr, statistic, 0.0, statistic > 0.0)
}

/// Two-sided Grubbs' test of `x` as the single outlier of `recent ∪ {x}`.
pub fn grubbs_test(x: f64, recent: &[f64], alpha: f64, min_samples: usize) -> TestOutcome {
    let mut sample: Vec<f64> = recent.iter().copied().filter(|v| v.is_finite()).collect();
    sample.push(x);
    let n = sample.len();
    if n < min_samples.max(3) {
        return TestOutcome::inconclusive(
            TestKind::Grubbs,
            0.0,
            format!("needs {} samples, have {}", min_samples.max(3), n),
        );
    }
    let Some(g_crit) = grubbs_critical_value(n, alpha) else {
        return TestOutcome::inconclusive(TestKind::Grubbs, 0.0, "no critical value");
    };
    let (Some(m), Some(s)) = (mean(&sample), sample_std_dev(&sample)) else {
        return TestOutcome::inconclusive(TestKind::Grubbs, g_crit, "no sample moments");
    };
    if s <= tolerance(m) {
        return TestOutcome::inconclusive(TestKind::Grubbs, g_crit, "zero spread in sample");
    }

    let dev = (x - m).abs();
    let g = dev / s;
    let most_extreme = sample.iter().all(|v| (v - m).abs() <= dev);
    let is_outlier = most_extreme && g > g_crit;

    let nf = n as f64;
    let denom = (nf - 1.0).powi(2) - nf * g * g;
    let p = if denom <= 0.0 {
        0.0
    } else {
        let t = (nf * (nf - 2.0) * g * g / denom).sqrt();
        (2.0 * nf * (1.0 - student_t_cdf(t, nf - 2.0))).min(1.0)
    };

    let outcome = TestOutcome::conclusive(TestKind::Grubbs, g, g_crit, is_outlier).with_p(p);
    if !most_extreme {
        outcome.with_note("value is not the most extreme sample point")
    } else {
        outcome
    }
}

/// Deviation from the seasonal bucket the timestamp falls in. `None` when
/// no pattern was detected or the bucket is too sparse.
pub fn seasonal_test(
    x: f64,
    ts: DateTime<Utc>,
    profile: &SeasonalProfile,
    threshold: f64,
) -> Option<TestOutcome> {
    let (component, bucket) = profile.expected_at(ts)?;
    let outcome = deviation_test(
        TestKind::Seasonal,
        x,
        bucket.mean,
        bucket.std_dev,
        1.0,
        threshold,
    );
    let label = match component {
        SeasonalComponent::HourOfDay => "hour-of-day bucket",
        SeasonalComponent::DayOfWeek => "day-of-week bucket",
    };
    Some(if outcome.conclusive && outcome.statistic.is_finite() {
        let p = normal_two_sided_p(outcome.statistic);
        outcome.with_p(p).with_note(label)
    } else {
        outcome.with_note(label)
    })
}

/// Run every applicable test and aggregate.
///
/// `recent` is the series' history immediately before the value (not
/// including it); `seasonal` is the profile to compare against, which may
/// come from a longer window than `baseline`.
pub fn evaluate(
    x: f64,
    ts: DateTime<Utc>,
    baseline: &BaselineSummary,
    seasonal: Option<&SeasonalProfile>,
    recent: &[f64],
    cfg: &StatisticalSettings,
) -> StatisticalReport {
    let mut tests = vec![
        z_score_test(x, baseline, cfg.z_threshold),
        modified_z_test(x, baseline, cfg.modified_z_threshold),
        iqr_test(x, baseline, cfg.iqr_multiplier),
        grubbs_test(x, recent, cfg.grubbs_alpha, cfg.grubbs_min_samples),
    ];
    if let Some(outcome) = seasonal.and_then(|p| seasonal_test(x, ts, p, cfg.seasonal_z_threshold)) {
        tests.push(outcome);
    }
    aggregate(tests, cfg.min_votes)
}

pub fn aggregate(tests: Vec<TestOutcome>, min_votes: usize) -> StatisticalReport {
    let conclusive: Vec<&TestOutcome> = tests.iter().filter(|t| t.conclusive).collect();
    let votes = conclusive.iter().filter(|t| t.is_outlier).count();
    let score = if conclusive.is_empty() {
        0.0
    } else {
        conclusive.iter().map(|t| t.score).sum::<f64>() / conclusive.len() as f64
    };
    let n_conclusive = conclusive.len();
    StatisticalReport {
        is_anomaly: votes >= min_votes || (n_conclusive > 0 && votes == n_conclusive),
        tests,
        score,
        votes,
        conclusive: n_conclusive,
    }
}
