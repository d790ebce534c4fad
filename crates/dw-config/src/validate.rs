//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::EngineConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::ParseError(_) => 13,
            ValidationError::SemanticError(_) => 14,
            ValidationError::InvalidValue { .. } => 11,
            ValidationError::VersionMismatch { .. } => 12,
        }
    }
}

impl From<ValidationError> for dw_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidValue { field, message } => {
                dw_common::Error::InvalidConfig { field, message }
            }
            ValidationError::VersionMismatch { expected, actual } => {
                dw_common::Error::ConfigVersion { expected, actual }
            }
            other => dw_common::Error::Config(other.to_string()),
        }
    }
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

fn require_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("Must be positive, got {}", value)));
    }
    Ok(())
}

fn require_fraction(field: &str, value: f64, lo_open: bool, hi_open: bool) -> ValidationResult<()> {
    let lo_ok = if lo_open { value > 0.0 } else { value >= 0.0 };
    let hi_ok = if hi_open { value < 1.0 } else { value <= 1.0 };
    if !value.is_finite() || !lo_ok || !hi_ok {
        let (l, h) = (if lo_open { "(" } else { "[" }, if hi_open { ")" } else { "]" });
        return Err(invalid(field, format!("Must be in {}0, 1{}, got {}", l, h, value)));
    }
    Ok(())
}

/// Longest duration any `*_secs` setting may span (100 years).
pub const MAX_DURATION_SECS: i64 = 100 * 365 * 86_400;

fn require_duration(field: &str, value: i64, allow_zero: bool) -> ValidationResult<()> {
    let lo_ok = if allow_zero { value >= 0 } else { value > 0 };
    if !lo_ok {
        let what = if allow_zero { "non-negative" } else { "positive" };
        return Err(invalid(field, format!("Must be {}, got {}", what, value)));
    }
    if value > MAX_DURATION_SECS {
        return Err(invalid(
            field,
            format!("Must be at most {} seconds, got {}", MAX_DURATION_SECS, value),
        ));
    }
    Ok(())
}

fn require_at_least(field: &str, value: usize, min: usize) -> ValidationResult<()> {
    if value < min {
        return Err(invalid(field, format!("Must be at least {}, got {}", min, value)));
    }
    Ok(())
}

/// Validate an engine configuration semantically.
pub fn validate_config(cfg: &EngineConfig) -> ValidationResult<()> {
    if cfg.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: cfg.schema_version.clone(),
        });
    }

    // Ingestion
    let ing = &cfg.ingestion;
    require_duration("ingestion.max_future_skew_secs", ing.max_future_skew_secs, true)?;
    require_duration("ingestion.max_age_secs", ing.max_age_secs, false)?;
    require_at_least("ingestion.max_name_len", ing.max_name_len, 1)?;

    // Baseline
    let base = &cfg.baseline;
    if base.windows.is_empty() {
        return Err(invalid(
            "baseline.windows",
            "At least one window is required".to_string(),
        ));
    }
    for (i, w) in base.windows.iter().enumerate() {
        if base.windows[..i].contains(w) {
            return Err(invalid("baseline.windows", format!("Duplicate window '{}'", w)));
        }
    }
    require_at_least("baseline.min_observations", base.min_observations, 2)?;
    if base.cold_start_threshold < base.min_observations {
        return Err(ValidationError::SemanticError(format!(
            "baseline.cold_start_threshold ({}) must not be below baseline.min_observations ({})",
            base.cold_start_threshold, base.min_observations
        )));
    }
    require_duration("baseline.refresh_interval_secs", base.refresh_interval_secs, true)?;
    require_at_least(
        "baseline.max_points_per_window",
        base.max_points_per_window,
        base.min_observations,
    )?;

    let seasonal = &base.seasonal;
    require_at_least("baseline.seasonal.min_bucket_samples", seasonal.min_bucket_samples, 1)?;
    require_fraction(
        "baseline.seasonal.strength_threshold",
        seasonal.strength_threshold,
        true,
        false,
    )?;
    if !(2..=24).contains(&seasonal.min_hourly_buckets) {
        return Err(invalid(
            "baseline.seasonal.min_hourly_buckets",
            format!("Must be in [2, 24], got {}", seasonal.min_hourly_buckets),
        ));
    }
    if !(2..=7).contains(&seasonal.min_daily_buckets) {
        return Err(invalid(
            "baseline.seasonal.min_daily_buckets",
            format!("Must be in [2, 7], got {}", seasonal.min_daily_buckets),
        ));
    }

    // Statistical
    let st = &cfg.statistical;
    require_positive("statistical.z_threshold", st.z_threshold)?;
    require_positive("statistical.modified_z_threshold", st.modified_z_threshold)?;
    require_positive("statistical.iqr_multiplier", st.iqr_multiplier)?;
    require_positive("statistical.seasonal_z_threshold", st.seasonal_z_threshold)?;
    require_fraction("statistical.grubbs_alpha", st.grubbs_alpha, true, true)?;
    require_at_least("statistical.grubbs_min_samples", st.grubbs_min_samples, 3)?;
    require_at_least("statistical.min_votes", st.min_votes, 1)?;
    require_at_least("statistical.recent_sample_size", st.recent_sample_size, 1)?;

    // ML
    let ml = &cfg.ml;
    require_at_least("ml.isolation.n_trees", ml.isolation.n_trees, 1)?;
    require_at_least("ml.isolation.subsample_size", ml.isolation.subsample_size, 2)?;
    if !(ml.isolation.contamination > 0.0 && ml.isolation.contamination < 0.5) {
        return Err(invalid(
            "ml.isolation.contamination",
            format!("Must be in (0, 0.5), got {}", ml.isolation.contamination),
        ));
    }
    require_at_least("ml.forest.n_trees", ml.forest.n_trees, 1)?;
    require_at_least("ml.forest.max_depth", ml.forest.max_depth, 1)?;
    require_at_least("ml.forest.min_samples_split", ml.forest.min_samples_split, 2)?;
    require_at_least("ml.min_training_samples", ml.min_training_samples, 2)?;
    require_at_least("ml.min_labeled_samples", ml.min_labeled_samples, 2)?;
    if ml.max_training_samples < ml.min_training_samples {
        return Err(ValidationError::SemanticError(format!(
            "ml.max_training_samples ({}) must not be below ml.min_training_samples ({})",
            ml.max_training_samples, ml.min_training_samples
        )));
    }
    require_duration("ml.retrain_interval_secs", ml.retrain_interval_secs, true)?;
    require_duration("ml.training_lookback_secs", ml.training_lookback_secs, false)?;

    // Heuristics
    let h = &cfg.heuristics;
    require_positive("heuristics.spike_factor", h.spike_factor)?;
    require_positive("heuristics.latency_factor", h.latency_factor)?;
    require_positive("heuristics.min_burst_events", h.min_burst_events)?;
    if !(h.saturation_percent > 0.0 && h.saturation_percent <= 100.0) {
        return Err(invalid(
            "heuristics.saturation_percent",
            format!("Must be in (0, 100], got {}", h.saturation_percent),
        ));
    }
    for (field, boost) in [
        ("heuristics.spike_boost", h.spike_boost),
        ("heuristics.drop_boost", h.drop_boost),
        ("heuristics.saturation_boost", h.saturation_boost),
        ("heuristics.latency_boost", h.latency_boost),
        ("heuristics.burst_boost", h.burst_boost),
        ("heuristics.off_hours_boost", h.off_hours_boost),
    ] {
        require_fraction(field, boost, false, false)?;
    }
    if h.off_hours_start > 23 || h.off_hours_end > 24 {
        return Err(invalid(
            "heuristics.off_hours_start",
            format!(
                "Hours must be within a day, got [{}, {})",
                h.off_hours_start, h.off_hours_end
            ),
        ));
    }
    if h.quiet_bucket_mean < 0.0 {
        return Err(invalid(
            "heuristics.quiet_bucket_mean",
            format!("Must be non-negative, got {}", h.quiet_bucket_mean),
        ));
    }

    // Scoring
    let sc = &cfg.scoring;
    if sc.statistical_weight < 0.0 || sc.ml_weight < 0.0 {
        return Err(invalid(
            "scoring.statistical_weight",
            "Weights must be non-negative".to_string(),
        ));
    }
    if sc.statistical_weight + sc.ml_weight <= 0.0 {
        return Err(ValidationError::SemanticError(
            "scoring weights must not both be zero".to_string(),
        ));
    }
    require_fraction("scoring.anomaly_threshold", sc.anomaly_threshold, true, false)?;
    require_at_least("scoring.unanimous_min_votes", sc.unanimous_min_votes, 1)?;

    // Storage / monitor
    require_duration("storage.retention_secs", cfg.storage.retention_secs, false)?;
    let tick = i64::try_from(cfg.monitor.tick_interval_secs).unwrap_or(i64::MAX);
    require_duration("monitor.tick_interval_secs", tick, false)?;
    require_at_least("monitor.event_ring_capacity", cfg.monitor.event_ring_capacity, 1)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_version_mismatch() {
        let mut cfg = EngineConfig::default();
        cfg.schema_version = "0.9.0".to_string();
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::VersionMismatch { .. }));
        assert_eq!(err.code(), 12);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.statistical.z_threshold = -1.0;
        match validate_config(&cfg) {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "statistical.z_threshold")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.scoring.statistical_weight = 0.0;
        cfg.scoring.ml_weight = 0.0;
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::SemanticError(_))
        ));
    }

    #[test]
    fn test_empty_and_duplicate_windows_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.baseline.windows.clear();
        assert!(validate_config(&cfg).is_err());

        cfg.baseline.windows = vec![dw_common::TimeWindow::Day, dw_common::TimeWindow::Day];
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_alpha_must_be_open_fraction() {
        let mut cfg = EngineConfig::default();
        cfg.statistical.grubbs_alpha = 1.0;
        assert!(validate_config(&cfg).is_err());
        cfg.statistical.grubbs_alpha = 0.01;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_durations_are_bounded() {
        let cases: [(&str, fn(&mut EngineConfig)); 7] = [
            ("ingestion.max_future_skew_secs", |c| c.ingestion.max_future_skew_secs = i64::MAX),
            ("ingestion.max_age_secs", |c| c.ingestion.max_age_secs = i64::MAX),
            ("baseline.refresh_interval_secs", |c| c.baseline.refresh_interval_secs = i64::MAX),
            ("ml.retrain_interval_secs", |c| c.ml.retrain_interval_secs = i64::MAX),
            ("ml.training_lookback_secs", |c| c.ml.training_lookback_secs = i64::MAX),
            ("storage.retention_secs", |c| c.storage.retention_secs = MAX_DURATION_SECS + 1),
            ("monitor.tick_interval_secs", |c| c.monitor.tick_interval_secs = u64::MAX),
        ];
        for (expected, set) in cases {
            let mut cfg = EngineConfig::default();
            set(&mut cfg);
            match validate_config(&cfg) {
                Err(ValidationError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("{}: unexpected {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_duration_upper_bound_is_inclusive() {
        let mut cfg = EngineConfig::default();
        cfg.storage.retention_secs = MAX_DURATION_SECS;
        cfg.ingestion.max_age_secs = MAX_DURATION_SECS;
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_converts_into_common_error() {
        let err: dw_common::Error = invalid("x.y", "bad".to_string()).into();
        assert_eq!(err.code(), 11);
        assert_eq!(err.category(), dw_common::ErrorCategory::Config);
    }
}
