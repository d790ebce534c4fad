//! driftwatch configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the engine configuration (`driftwatch.json`)
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation
//! - Built-in presets
//! - Config snapshots recorded alongside detection runs

pub mod load;
pub mod preset;
pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use load::{load_config, load_config_file, ConfigError, LoadOptions, LoadedConfig};
pub use preset::{list_presets, PresetError, PresetInfo, PresetName};
pub use resolve::{default_db_path, resolve_config, ConfigPath, ConfigSource};
pub use settings::{
    BaselineSettings, EngineConfig, ForestSettings, HeuristicSettings, IngestionSettings,
    IsolationSettings, MlSettings, MonitorSettings, ScoringSettings, SeasonalSettings,
    StatisticalSettings, StorageSettings,
};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult, MAX_DURATION_SECS};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
