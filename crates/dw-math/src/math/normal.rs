//! Standard normal distribution helpers.

use super::special::{regularized_gamma_p, regularized_gamma_q};

/// Φ(z), the standard normal CDF.
///
/// Uses erf(x) = P(1/2, x²) so no separate erf approximation is needed.
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z == f64::INFINITY {
        return 1.0;
    }
    if z == f64::NEG_INFINITY {
        return 0.0;
    }
    let half_x2 = 0.5 * z * z;
    let erf_abs = regularized_gamma_p(0.5, half_x2);
    if z >= 0.0 {
        0.5 * (1.0 + erf_abs)
    } else {
        0.5 * (1.0 - erf_abs)
    }
}

/// Two-sided tail probability P(|Z| ≥ |z|).
pub fn normal_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z.is_infinite() {
        return 0.0;
    }
    regularized_gamma_q(0.5, 0.5 * z * z)
}
