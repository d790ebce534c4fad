//! Built-in detection presets.
//!
//! - Default: the stock thresholds
//! - Sensitive: lower thresholds, more alerts, for quiet well-understood series
//! - Conservative: higher thresholds, fewer alerts, for noisy production fleets

use crate::settings::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    Default,
    /// Lower thresholds; more false positives acceptable.
    Sensitive,
    /// Higher thresholds; only strong deviations alert.
    Conservative,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] = &[
        PresetName::Default,
        PresetName::Sensitive,
        PresetName::Conservative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Default => "default",
            PresetName::Sensitive => "sensitive",
            PresetName::Conservative => "conservative",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "default" | "standard" => Some(PresetName::Default),
            "sensitive" | "aggressive" => Some(PresetName::Sensitive),
            "conservative" | "quiet" | "prod" => Some(PresetName::Conservative),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Default => "Stock thresholds (z 3.0, modified z 3.5, IQR 1.5, score 0.6)",
            PresetName::Sensitive => {
                "Lower thresholds and a single vote to flag; for quiet, well-understood series"
            }
            PresetName::Conservative => {
                "Higher thresholds and three votes to flag; for noisy production fleets"
            }
        }
    }

    /// Build the configuration for this preset.
    pub fn config(&self) -> EngineConfig {
        match self {
            PresetName::Default => EngineConfig::default(),
            PresetName::Sensitive => sensitive_preset(),
            PresetName::Conservative => conservative_preset(),
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset operations.
#[derive(Debug, Clone)]
pub enum PresetError {
    UnknownPreset(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::UnknownPreset(name) => {
                write!(
                    f,
                    "Unknown preset '{}'. Available: {}",
                    name,
                    PresetName::ALL
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }
}

impl std::error::Error for PresetError {}

fn sensitive_preset() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.description = Some("sensitive preset".to_string());
    cfg.statistical.z_threshold = 2.5;
    cfg.statistical.modified_z_threshold = 3.0;
    cfg.statistical.iqr_multiplier = 1.0;
    cfg.statistical.seasonal_z_threshold = 2.5;
    cfg.statistical.grubbs_alpha = 0.1;
    cfg.statistical.min_votes = 1;
    cfg.ml.isolation.contamination = 0.1;
    cfg.heuristics.spike_factor = 2.0;
    cfg.heuristics.latency_factor = 1.5;
    cfg.heuristics.saturation_percent = 90.0;
    cfg.scoring.anomaly_threshold = 0.5;
    cfg.scoring.unanimous_min_votes = 2;
    cfg
}

fn conservative_preset() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.description = Some("conservative preset".to_string());
    cfg.statistical.z_threshold = 4.0;
    cfg.statistical.modified_z_threshold = 5.0;
    cfg.statistical.iqr_multiplier = 3.0;
    cfg.statistical.seasonal_z_threshold = 4.0;
    cfg.statistical.grubbs_alpha = 0.01;
    cfg.statistical.min_votes = 3;
    cfg.baseline.cold_start_threshold = 60;
    cfg.ml.isolation.contamination = 0.02;
    cfg.heuristics.spike_factor = 5.0;
    cfg.heuristics.latency_factor = 3.0;
    cfg.heuristics.saturation_percent = 98.0;
    cfg.scoring.anomaly_threshold = 0.75;
    cfg.scoring.unanimous_min_votes = 4;
    cfg
}

/// Information about a preset for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub description: String,
    pub z_threshold: f64,
    pub modified_z_threshold: f64,
    pub iqr_multiplier: f64,
    pub min_votes: usize,
    pub anomaly_threshold: f64,
}

impl PresetInfo {
    pub fn from_preset(name: PresetName) -> Self {
        let cfg = name.config();
        Self {
            name: name.as_str().to_string(),
            description: name.description().to_string(),
            z_threshold: cfg.statistical.z_threshold,
            modified_z_threshold: cfg.statistical.modified_z_threshold,
            iqr_multiplier: cfg.statistical.iqr_multiplier,
            min_votes: cfg.statistical.min_votes,
            anomaly_threshold: cfg.scoring.anomaly_threshold,
        }
    }
}

/// List all available presets with summary information.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|&name| PresetInfo::from_preset(name))
        .collect()
}
