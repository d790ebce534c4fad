//! Configuration loading with provenance.
//!
//! The effective configuration is built in layers: a preset (or the
//! built-in defaults), then the resolved `driftwatch.json` merged on top
//! key by key, then semantic validation.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::preset::PresetName;
use crate::resolve::{resolve_config, ConfigPath};
use crate::settings::EngineConfig;
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_config, ValidationError};

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for dw_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ValidationError(v) => v.into(),
            ConfigError::IoError { source, .. } => dw_common::Error::Io(source),
            other => dw_common::Error::Config(other.to_string()),
        }
    }
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Explicit config file path (highest priority).
    pub config_path: Option<PathBuf>,
    /// Preset used as the base layer instead of the defaults.
    pub preset: Option<PresetName>,
}

/// Loaded configuration with provenance information.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub path: ConfigPath,
    pub snapshot: ConfigSnapshot,
}

/// Load configuration with the standard resolution order.
pub fn load_config(options: &LoadOptions) -> Result<LoadedConfig, ConfigError> {
    let path = resolve_config(options.config_path.as_deref());
    let base = options.preset.unwrap_or(PresetName::Default).config();

    let (config, raw) = match &path.path {
        Some(p) => {
            let raw = read_file(p)?;
            (merge_file(base, p, &raw)?, Some(raw))
        }
        None => (base, None),
    };

    validate_config(&config)?;
    let snapshot = ConfigSnapshot::new(&config, &path, raw.as_deref());
    Ok(LoadedConfig {
        config,
        path,
        snapshot,
    })
}

/// Parse and validate a single file without resolution (for `config validate`).
pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = read_file(path)?;
    let config = merge_file(EngineConfig::default(), path, &raw)?;
    validate_config(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_file(base: EngineConfig, path: &Path, raw: &str) -> Result<EngineConfig, ConfigError> {
    let parse_err = |source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    };
    let overlay: serde_json::Value = serde_json::from_str(raw).map_err(parse_err)?;
    let mut merged = serde_json::to_value(&base).map_err(parse_err)?;
    merge_json(&mut merged, overlay);
    serde_json::from_value(merged).map_err(parse_err)
}

/// Recursively overlay `patch` onto `target`; objects merge, everything
/// else replaces.
fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(t), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                match t.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        t.insert(k, v);
                    }
                }
            }
        }
        (t, p) => *t = p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_overlays_nested_keys() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": [1, 2]});
        merge_json(&mut base, json!({"a": {"y": 5}, "b": [9]}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 5}, "b": [9]}));
    }

    #[test]
    fn test_file_overrides_preset_layer() {
        let base = PresetName::Sensitive.config();
        let merged = merge_file(
            base,
            Path::new("inline.json"),
            r#"{"statistical": {"min_votes": 2}}"#,
        )
        .unwrap();
        // Overridden key.
        assert_eq!(merged.statistical.min_votes, 2);
        // Untouched sensitive value survives.
        assert_eq!(merged.statistical.z_threshold, 2.5);
    }

    #[test]
    fn test_missing_cli_path_is_not_found() {
        let opts = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/dw/driftwatch.json")),
            preset: None,
        };
        assert!(matches!(load_config(&opts), Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = merge_file(EngineConfig::default(), Path::new("x.json"), "{nope").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        let common: dw_common::Error = err.into();
        assert_eq!(common.category(), dw_common::ErrorCategory::Config);
    }
}
