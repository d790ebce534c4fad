//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system config → built-in defaults.

use std::path::{Path, PathBuf};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPath {
    /// Path to driftwatch.json (or None when using defaults).
    pub path: Option<PathBuf>,

    /// Where the path came from (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/driftwatch/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::CliArgument => "cli",
            ConfigSource::Environment => "env",
            ConfigSource::XdgConfig => "xdg",
            ConfigSource::SystemConfig => "system",
            ConfigSource::BuiltinDefault => "default",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "DRIFTWATCH_CONFIG";
pub const ENV_CONFIG_DIR: &str = "DRIFTWATCH_CONFIG_DIR";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "driftwatch.json";

/// Application name for XDG directories.
pub const APP_NAME: &str = "driftwatch";

/// Resolve the configuration path.
///
/// An explicit CLI path is returned even if it does not exist, so the
/// loader can report it; every other candidate must exist to be chosen.
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    if let Some(path) = cli_path {
        return ConfigPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    let found = |path: PathBuf, source: ConfigSource| {
        path.exists().then_some(ConfigPath {
            path: Some(path),
            source,
        })
    };

    std::env::var(ENV_CONFIG_PATH)
        .ok()
        .and_then(|p| found(PathBuf::from(p), ConfigSource::Environment))
        .or_else(|| {
            std::env::var(ENV_CONFIG_DIR).ok().and_then(|dir| {
                found(
                    PathBuf::from(dir).join(CONFIG_FILENAME),
                    ConfigSource::Environment,
                )
            })
        })
        .or_else(|| {
            xdg_config_dir()
                .and_then(|dir| found(dir.join(CONFIG_FILENAME), ConfigSource::XdgConfig))
        })
        .or_else(|| {
            found(
                system_config_dir().join(CONFIG_FILENAME),
                ConfigSource::SystemConfig,
            )
        })
        .unwrap_or_default()
}

/// Get the XDG config directory for driftwatch.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

/// Default database location under the XDG data directory.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME).join("driftwatch.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_cli_path_wins_even_if_missing() {
        let resolved = resolve_config(Some(Path::new("/nonexistent/driftwatch.json")));
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(
            resolved.path.as_deref(),
            Some(Path::new("/nonexistent/driftwatch.json"))
        );
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/driftwatch"));
    }
}
