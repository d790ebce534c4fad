//! driftwatch math utilities.
//!
//! Everything here is a pure function over `f64` slices or scalars; callers
//! own allocation and error policy.

pub mod math;

pub use math::descriptive::*;
pub use math::normal::{normal_cdf, normal_two_sided_p};
pub use math::special::{log_beta, log_gamma, regularized_beta, regularized_gamma_p, regularized_gamma_q};
pub use math::student_t::{grubbs_critical_value, student_t_cdf, student_t_quantile};
