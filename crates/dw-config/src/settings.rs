//! Engine configuration types.
//!
//! Every section implements `Default`, and every field carries
//! `#[serde(default)]` through its section, so a partial `driftwatch.json`
//! only needs to name the values it overrides.

use std::path::PathBuf;

use dw_common::TimeWindow;
use serde::{Deserialize, Serialize};

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub schema_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub ingestion: IngestionSettings,
    pub baseline: BaselineSettings,
    pub statistical: StatisticalSettings,
    pub ml: MlSettings,
    pub heuristics: HeuristicSettings,
    pub scoring: ScoringSettings,
    pub storage: StorageSettings,
    pub monitor: MonitorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: None,
            ingestion: IngestionSettings::default(),
            baseline: BaselineSettings::default(),
            statistical: StatisticalSettings::default(),
            ml: MlSettings::default(),
            heuristics: HeuristicSettings::default(),
            scoring: ScoringSettings::default(),
            storage: StorageSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration document. Missing sections take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Point acceptance rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Maximum seconds a timestamp may lie in the future.
    pub max_future_skew_secs: i64,
    /// Maximum age of an accepted point.
    pub max_age_secs: i64,
    pub max_name_len: usize,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_future_skew_secs: 300,
            max_age_secs: 30 * 86_400,
            max_name_len: 128,
        }
    }
}

/// Rolling baseline maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSettings {
    /// Windows to maintain, in lookup priority order.
    pub windows: Vec<TimeWindow>,
    /// A baseline with fewer observations is not fitted at all.
    pub min_observations: usize,
    /// Baselines below this many observations are flagged cold-start.
    pub cold_start_threshold: usize,
    pub refresh_interval_secs: i64,
    /// Cap on points read per window refresh (most recent kept).
    pub max_points_per_window: usize,
    pub seasonal: SeasonalSettings,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            windows: vec![TimeWindow::Hour, TimeWindow::Day, TimeWindow::Week],
            min_observations: 10,
            cold_start_threshold: 30,
            refresh_interval_secs: 300,
            max_points_per_window: 50_000,
            seasonal: SeasonalSettings::default(),
        }
    }
}

/// Hour-of-day / day-of-week pattern detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalSettings {
    pub enabled: bool,
    pub min_bucket_samples: usize,
    /// Minimum η² for a pattern to count.
    pub strength_threshold: f64,
    pub min_hourly_buckets: usize,
    pub min_daily_buckets: usize,
}

impl Default for SeasonalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bucket_samples: 3,
            strength_threshold: 0.3,
            min_hourly_buckets: 12,
            min_daily_buckets: 4,
        }
    }
}

/// Outlier test thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalSettings {
    pub z_threshold: f64,
    pub modified_z_threshold: f64,
    pub iqr_multiplier: f64,
    pub grubbs_alpha: f64,
    pub grubbs_min_samples: usize,
    pub seasonal_z_threshold: f64,
    /// Votes needed for the statistical detector to flag a point.
    pub min_votes: usize,
    /// Points preceding the scored point used for Grubbs and ML context.
    pub recent_sample_size: usize,
}

impl Default for StatisticalSettings {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            modified_z_threshold: 3.5,
            iqr_multiplier: 1.5,
            grubbs_alpha: 0.05,
            grubbs_min_samples: 7,
            seasonal_z_threshold: 3.0,
            min_votes: 2,
            recent_sample_size: 50,
        }
    }
}

/// Model training and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlSettings {
    pub enabled: bool,
    pub isolation: IsolationSettings,
    pub forest: ForestSettings,
    pub min_training_samples: usize,
    pub min_labeled_samples: usize,
    pub retrain_interval_secs: i64,
    pub training_lookback_secs: i64,
    /// Cap on points fed to one training run (most recent kept).
    pub max_training_samples: usize,
    pub seed: u64,
}

impl Default for MlSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            isolation: IsolationSettings::default(),
            forest: ForestSettings::default(),
            min_training_samples: 100,
            min_labeled_samples: 20,
            retrain_interval_secs: 3_600,
            training_lookback_secs: 7 * 86_400,
            max_training_samples: 5_000,
            seed: 0x5eed_d21f,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationSettings {
    pub n_trees: usize,
    pub subsample_size: usize,
    /// Expected anomaly share in training data.
    pub contamination: f64,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            n_trees: 100,
            subsample_size: 256,
            contamination: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestSettings {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for ForestSettings {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 4,
        }
    }
}

/// Domain rules per metric kind. Boosts are added to the combined score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicSettings {
    pub enabled: bool,
    pub spike_factor: f64,
    pub spike_boost: f64,
    pub drop_boost: f64,
    pub saturation_percent: f64,
    pub saturation_boost: f64,
    pub latency_factor: f64,
    pub latency_boost: f64,
    pub min_burst_events: f64,
    pub burst_boost: f64,
    /// Off-hours window in UTC hours, `[start, end)`; wraps past midnight
    /// when `start > end`.
    pub off_hours_start: u32,
    pub off_hours_end: u32,
    /// Hourly bucket means at or below this count as a quiet hour.
    pub quiet_bucket_mean: f64,
    pub off_hours_boost: f64,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            spike_factor: 3.0,
            spike_boost: 0.2,
            drop_boost: 0.15,
            saturation_percent: 95.0,
            saturation_boost: 0.25,
            latency_factor: 2.0,
            latency_boost: 0.2,
            min_burst_events: 10.0,
            burst_boost: 0.3,
            off_hours_start: 0,
            off_hours_end: 6,
            quiet_bucket_mean: 0.5,
            off_hours_boost: 0.2,
        }
    }
}

/// Score combination and anomaly decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub statistical_weight: f64,
    pub ml_weight: f64,
    pub anomaly_threshold: f64,
    /// Unanimous statistical votes at or above this count flag a point
    /// regardless of score.
    pub unanimous_min_votes: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            statistical_weight: 0.6,
            ml_weight: 0.4,
            anomaly_threshold: 0.6,
            unanimous_min_votes: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database path; `None` uses the XDG data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Raw points older than this are pruned during maintenance.
    pub retention_secs: i64,
    pub busy_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            retention_secs: 30 * 86_400,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub tick_interval_secs: u64,
    pub event_ring_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            event_ring_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_json("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.schema_version, crate::CONFIG_SCHEMA_VERSION);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg =
            EngineConfig::from_json(r#"{"statistical": {"z_threshold": 2.5}}"#).unwrap();
        assert_eq!(cfg.statistical.z_threshold, 2.5);
        assert_eq!(cfg.statistical.modified_z_threshold, 3.5);
        assert_eq!(cfg.scoring.anomaly_threshold, 0.6);
    }

    #[test]
    fn windows_parse_as_snake_case() {
        let cfg = EngineConfig::from_json(r#"{"baseline": {"windows": ["day", "hour"]}}"#)
            .unwrap();
        assert_eq!(cfg.baseline.windows, vec![TimeWindow::Day, TimeWindow::Hour]);
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let mut cfg = EngineConfig::default();
        cfg.storage.db_path = Some(PathBuf::from("/tmp/dw.db"));
        cfg.ml.seed = 7;
        let back = EngineConfig::from_json(&cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
