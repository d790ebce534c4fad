//! Configuration snapshots for reproducible detection runs.
//!
//! A snapshot records which file the engine configuration came from, the
//! SHA-256 of that file, and a hash of the effective (post-default) config,
//! so two runs can be checked for identical thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::{ConfigPath, ConfigSource};
use crate::settings::EngineConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// Path the config was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration (cli, env, xdg, system, default).
    pub source: String,

    /// SHA-256 of the raw file content, when a file was read.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// SHA-256 of the effective configuration serialized as JSON.
    pub effective_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub windows: Vec<String>,
    pub z_threshold: f64,
    pub modified_z_threshold: f64,
    pub min_votes: usize,
    pub anomaly_threshold: f64,
    pub ml_enabled: bool,
}

impl ConfigSummary {
    fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            windows: cfg.baseline.windows.iter().map(|w| w.to_string()).collect(),
            z_threshold: cfg.statistical.z_threshold,
            modified_z_threshold: cfg.statistical.modified_z_threshold,
            min_votes: cfg.statistical.min_votes,
            anomaly_threshold: cfg.scoring.anomaly_threshold,
            ml_enabled: cfg.ml.enabled,
        }
    }
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration and its raw file text.
    pub fn new(cfg: &EngineConfig, path: &ConfigPath, raw: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: cfg.schema_version.clone(),
            path: path.path.as_ref().map(|p| p.display().to_string()),
            source: path.source.as_str().to_string(),
            file_hash: raw.map(hash_content),
            effective_hash: effective_hash(cfg),
            summary: ConfigSummary::from_config(cfg),
        }
    }

    /// Create a snapshot for built-in defaults (no config file loaded).
    pub fn defaults_only() -> Self {
        let cfg = EngineConfig::default();
        Self::new(
            &cfg,
            &ConfigPath {
                path: None,
                source: ConfigSource::BuiltinDefault,
            },
            None,
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot describes the same effective configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }

    /// Short identifier (first 12 chars of the effective hash).
    pub fn short_id(&self) -> &str {
        &self.effective_hash[..12.min(self.effective_hash.len())]
    }
}

fn effective_hash(cfg: &EngineConfig) -> String {
    // Serialization of plain data structs cannot fail; fall back to Debug
    // output rather than panicking.
    let text = serde_json::to_string(cfg).unwrap_or_else(|_| format!("{:?}", cfg));
    hash_content(&text)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert_eq!(snapshot.source, "default");
        assert!(snapshot.file_hash.is_none());
        assert_eq!(snapshot.summary.windows, vec!["hour", "day", "week"]);
    }

    #[test]
    fn test_snapshot_short_id() {
        assert_eq!(ConfigSnapshot::defaults_only().short_id().len(), 12);
    }

    #[test]
    fn test_snapshot_matches_on_effective_config() {
        let s1 = ConfigSnapshot::defaults_only();
        let path = ConfigPath {
            path: Some(PathBuf::from("/tmp/driftwatch.json")),
            source: ConfigSource::CliArgument,
        };
        // An empty file yields the defaults, so the effective hash matches.
        let s2 = ConfigSnapshot::new(&EngineConfig::default(), &path, Some("{}"));
        assert!(s1.matches(&s2));
        assert_eq!(s2.file_hash.as_deref(), Some(hash_content("{}").as_str()));

        let mut changed = EngineConfig::default();
        changed.statistical.z_threshold = 2.0;
        assert!(!s1.matches(&ConfigSnapshot::new(&changed, &path, None)));
    }

    #[test]
    fn test_hash_content() {
        let hash1 = hash_content("test");
        assert_eq!(hash1, hash_content("test"));
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::defaults_only();
        let restored = ConfigSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert!(snapshot.matches(&restored));
    }
}
