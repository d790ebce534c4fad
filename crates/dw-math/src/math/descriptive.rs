//! Descriptive statistics over samples.
//!
//! Functions that take `sorted` expect ascending order with no NaNs; use
//! [`sorted_finite`] to prepare input.

use serde::{Deserialize, Serialize};

/// Copy the finite values of `samples` and sort them ascending.
pub fn sorted_finite(samples: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Sample variance (n - 1 denominator). `None` for fewer than two samples.
///
/// Two-pass to avoid catastrophic cancellation on large offsets.
pub fn sample_variance(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let m = mean(samples)?;
    let ss: f64 = samples.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (samples.len() - 1) as f64)
}

/// Sample standard deviation.
pub fn sample_std_dev(samples: &[f64]) -> Option<f64> {
    sample_variance(samples).map(f64::sqrt)
}

/// Percentile of a sorted slice with linear interpolation, `p` in [0, 1].
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let idx = p.clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = idx.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            let frac = idx - lo as f64;
            sorted[lo] * (1.0 - frac) + sorted[hi] * frac
        }
    }
}

/// Median of a sorted slice.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    percentile_sorted(sorted, 0.5)
}

/// Raw median absolute deviation around `center` (unscaled).
pub fn median_abs_deviation(samples: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = samples.iter().map(|v| (v - center).abs()).collect();
    median_sorted(&sorted_finite(&deviations))
}

/// Quartiles and interquartile range of a sorted slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    pub fn from_sorted(sorted: &[f64]) -> Self {
        Self {
            q1: percentile_sorted(sorted, 0.25),
            median: percentile_sorted(sorted, 0.5),
            q3: percentile_sorted(sorted, 0.75),
        }
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Tukey fences `(q1 - k*iqr, q3 + k*iqr)`.
    pub fn fences(&self, k: f64) -> (f64, f64) {
        let iqr = self.iqr();
        (self.q1 - k * iqr, self.q3 + k * iqr)
    }
}

/// Share of total variance explained by grouping (η²).
///
/// `groups` holds (count, mean) per group; `grand_mean` and `total_ss` are
/// for the pooled sample. Returns 0 when the pooled sample has no variance.
pub fn eta_squared(groups: &[(usize, f64)], grand_mean: f64, total_ss: f64) -> f64 {
    if total_ss <= f64::EPSILON {
        return 0.0;
    }
    let between: f64 = groups
        .iter()
        .map(|(n, m)| *n as f64 * (m - grand_mean).powi(2))
        .sum();
    (between / total_ss).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_finite_drops_nan_and_inf() {
        let v = sorted_finite(&[3.0, f64::NAN, 1.0, f64::INFINITY, 2.0]);
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_and_variance() {
        let s = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&s), Some(5.0));
        // Population variance is 4; sample variance is 32/7.
        assert!((sample_variance(&s).unwrap() - 32.0 / 7.0).abs() < 1e-12);
        assert!(sample_variance(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn percentile_interpolates() {
        let s = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_sorted(&s, 0.0), 10.0);
        assert_eq!(percentile_sorted(&s, 1.0), 50.0);
        assert_eq!(percentile_sorted(&s, 0.5), 30.0);
        assert!((percentile_sorted(&s, 0.1) - 14.0).abs() < 1e-12);
        assert!(percentile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn mad_of_known_sample() {
        let s = [1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0];
        // median 2, deviations [1,1,0,0,2,4,7] -> median 1
        assert_eq!(median_abs_deviation(&s, 2.0), 1.0);
    }

    #[test]
    fn quartile_fences() {
        let s: Vec<f64> = (1..=9).map(|v| v as f64).collect();
        let q = Quartiles::from_sorted(&s);
        assert_eq!(q.q1, 3.0);
        assert_eq!(q.q3, 7.0);
        assert_eq!(q.fences(1.5), (-3.0, 13.0));
    }

    #[test]
    fn eta_squared_extremes() {
        // Two groups perfectly separated: all variance is between groups.
        let values = [0.0, 0.0, 10.0, 10.0];
        let grand = 5.0;
        let total: f64 = values.iter().map(|v: &f64| (v - grand).powi(2)).sum();
        let eta = eta_squared(&[(2, 0.0), (2, 10.0)], grand, total);
        assert!((eta - 1.0).abs() < 1e-12);
        assert_eq!(eta_squared(&[(2, 1.0)], 1.0, 0.0), 0.0);
    }
}
