//! Property-based tests for dw-math numerical functions.

use dw_math::{
    grubbs_critical_value, median_sorted, normal_cdf, percentile_sorted, regularized_beta,
    sorted_finite, student_t_cdf, student_t_quantile, Quartiles,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Percentiles are monotone in p and bounded by the sample range.
    #[test]
    fn percentile_monotone(mut values in prop::collection::vec(-1e6..1e6f64, 1..200),
                           p1 in 0.0..1.0f64, p2 in 0.0..1.0f64) {
        values = sorted_finite(&values);
        let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
        let a = percentile_sorted(&values, lo);
        let b = percentile_sorted(&values, hi);
        prop_assert!(a <= b + 1e-9);
        prop_assert!(a >= values[0] - 1e-9);
        prop_assert!(b <= values[values.len() - 1] + 1e-9);
    }

    /// Median sits between the quartiles.
    #[test]
    fn quartiles_ordered(values in prop::collection::vec(-1e3..1e3f64, 1..100)) {
        let sorted = sorted_finite(&values);
        let q = Quartiles::from_sorted(&sorted);
        prop_assert!(q.q1 <= q.median + 1e-12);
        prop_assert!(q.median <= q.q3 + 1e-12);
        prop_assert!((q.median - median_sorted(&sorted)).abs() < 1e-12);
        prop_assert!(q.iqr() >= 0.0);
    }

    /// The incomplete beta function is a CDF in x.
    #[test]
    fn regularized_beta_in_unit_interval(x in 0.0..1.0f64, a in 0.1..50.0f64, b in 0.1..50.0f64) {
        let v = regularized_beta(x, a, b);
        prop_assert!((0.0..=1.0).contains(&v), "I_{}({}, {}) = {}", x, a, b, v);
    }

    /// t quantile inverts the t CDF.
    #[test]
    fn t_quantile_roundtrip(p in 0.001..0.999f64, dof in 1.0..200.0f64) {
        let t = student_t_quantile(p, dof);
        let back = student_t_cdf(t, dof);
        prop_assert!((back - p).abs() < 1e-7, "p={} dof={} t={} back={}", p, dof, t, back);
    }

    /// Heavier tails at low dof: |t quantile| shrinks toward the normal as dof grows.
    #[test]
    fn t_tail_heavier_than_normal(p in 0.9..0.999f64) {
        let t5 = student_t_quantile(p, 5.0);
        let t50 = student_t_quantile(p, 50.0);
        prop_assert!(t5 > t50);
        prop_assert!(normal_cdf(t50) > p - 1e-3);
    }

    /// Grubbs critical value grows with sample size and stays below the
    /// algebraic bound (n-1)/sqrt(n).
    #[test]
    fn grubbs_bounds(n in 3usize..500) {
        let g = grubbs_critical_value(n, 0.05).unwrap();
        let bound = (n as f64 - 1.0) / (n as f64).sqrt();
        prop_assert!(g > 0.0 && g <= bound + 1e-9);
        if n > 3 {
            let prev = grubbs_critical_value(n - 1, 0.05).unwrap();
            prop_assert!(g >= prev - 1e-9);
        }
    }
}
