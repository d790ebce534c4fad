//! Student's t distribution and the Grubbs' test critical value.

use super::special::regularized_beta;

const QUANTILE_MAX_ITERS: usize = 200;
const QUANTILE_TOL: f64 = 1e-12;

/// CDF of Student's t with `dof` degrees of freedom.
pub fn student_t_cdf(t: f64, dof: f64) -> f64 {
    if t.is_nan() || dof.is_nan() || dof <= 0.0 {
        return f64::NAN;
    }
    if t == f64::INFINITY {
        return 1.0;
    }
    if t == f64::NEG_INFINITY {
        return 0.0;
    }
    let x = dof / (dof + t * t);
    let tail = 0.5 * regularized_beta(x, 0.5 * dof, 0.5);
    if t > 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Quantile (inverse CDF) of Student's t.
///
/// Bracket-and-bisect; the CDF is monotone so this always converges.
pub fn student_t_quantile(p: f64, dof: f64) -> f64 {
    if p.is_nan() || dof.is_nan() || dof <= 0.0 || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    if p == 0.5 {
        return 0.0;
    }
    // Solve in the upper half and mirror.
    let (target, sign) = if p > 0.5 { (p, 1.0) } else { (1.0 - p, -1.0) };

    let mut lo = 0.0;
    let mut hi = 1.0;
    while student_t_cdf(hi, dof) < target {
        lo = hi;
        hi *= 2.0;
        if hi > 1e12 {
            return sign * f64::INFINITY;
        }
    }
    for _ in 0..QUANTILE_MAX_ITERS {
        let mid = 0.5 * (lo + hi);
        if student_t_cdf(mid, dof) < target {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < QUANTILE_TOL * hi.max(1.0) {
            break;
        }
    }
    sign * 0.5 * (lo + hi)
}

/// Two-sided Grubbs' critical value for a sample of size `n` at level `alpha`.
///
/// `G_crit = (n-1)/sqrt(n) * sqrt(t² / (n - 2 + t²))` with
/// `t = t_{1 - alpha/(2n), n-2}`. Returns `None` for `n < 3` or `alpha`
/// outside (0, 1).
pub fn grubbs_critical_value(n: usize, alpha: f64) -> Option<f64> {
    if n < 3 || !(alpha > 0.0 && alpha < 1.0) {
        return None;
    }
    let nf = n as f64;
    let t = student_t_quantile(1.0 - alpha / (2.0 * nf), nf - 2.0);
    if !t.is_finite() {
        return None;
    }
    let t2 = t * t;
    Some((nf - 1.0) / nf.sqrt() * (t2 / (nf - 2.0 + t2)).sqrt())
}
