//! Exit codes for the dw-core CLI.
//!
//! Exit code ranges:
//! - 0-1: operational outcomes (parse the outcome from the code, not output)
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors

use dw_common::{Error, ErrorCategory};

/// Exit codes for dw-core operations. Stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Nothing anomalous.
    Clean = 0,

    /// At least one anomaly was detected or listed.
    AnomaliesFound = 1,

    /// Invalid arguments or input.
    ArgsError = 10,

    /// Configuration could not be loaded or validated.
    ConfigError = 11,

    /// SQLite store unavailable or corrupt.
    StoreError = 15,

    /// Internal error (bug).
    InternalError = 20,

    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Operational outcomes are not errors; they communicate results.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Code name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::AnomaliesFound => "OK_ANOMALIES",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StoreError => "ERR_STORE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Map an engine error to the exit code the CLI reports for it.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Ingestion => ExitCode::ArgsError,
            ErrorCategory::Storage => match err {
                Error::AnomalyNotFound { .. } | Error::BaselineSchema { .. } => {
                    ExitCode::ArgsError
                }
                _ => ExitCode::StoreError,
            },
            ErrorCategory::Io => ExitCode::IoError,
            ErrorCategory::Detection | ErrorCategory::Model => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(ExitCode::AnomaliesFound.is_operational());
        assert!(!ExitCode::AnomaliesFound.is_error());
        assert!(ExitCode::StoreError.is_user_error());
        assert!(ExitCode::IoError.is_error());
        assert!(!ExitCode::InternalError.is_user_error());
    }

    #[test]
    fn error_mapping() {
        assert_eq!(
            ExitCode::for_error(&Error::Config("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Storage("locked".into())),
            ExitCode::StoreError
        );
        assert_eq!(
            ExitCode::for_error(&Error::AnomalyNotFound { id: "x".into() }),
            ExitCode::ArgsError
        );
        assert_eq!(
            ExitCode::for_error(&Error::InvalidPoint("nan".into())),
            ExitCode::ArgsError
        );
    }

    #[test]
    fn display() {
        assert_eq!(ExitCode::StoreError.to_string(), "ERR_STORE (15)");
    }
}
