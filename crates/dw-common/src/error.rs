//! Error types for driftwatch.
//!
//! Every error carries a stable numeric code, a category, a recoverability
//! hint and a remediation string, so the CLI can render it for humans and
//! serialize it for machines:
//!
//! ```text
//! ✗ Storage Error
//!   Reason: database is locked
//!   Fix: Another driftwatch process holds the database. Retry, or point --db elsewhere.
//! ```
//!
//! ```json
//! { "code": 50, "category": "storage", "message": "storage error: database is locked",
//!   "recoverable": true, "suggested_action": "retry" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for driftwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Metric parsing and validation errors.
    Ingestion,
    /// Statistical / numerical errors during detection.
    Detection,
    /// Model training and scoring errors.
    Model,
    /// SQLite store errors.
    Storage,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Ingestion => write!(f, "ingestion"),
            ErrorCategory::Detection => write!(f, "detection"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested follow-up for automation consuming JSON errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Retry,
    ResetConfig,
    RunCheck,
    FixInput,
    Skip,
    RefreshBaseline,
    Abort,
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SuggestedAction::Retry => "retry",
            SuggestedAction::ResetConfig => "reset_config",
            SuggestedAction::RunCheck => "run_check",
            SuggestedAction::FixInput => "fix_input",
            SuggestedAction::Skip => "skip",
            SuggestedAction::RefreshBaseline => "refresh_baseline",
            SuggestedAction::Abort => "abort",
            SuggestedAction::ManualIntervention => "manual_intervention",
        };
        write!(f, "{}", s)
    }
}

/// Unified error type for driftwatch.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    #[error("configuration schema mismatch: expected {expected}, got {actual}")]
    ConfigVersion { expected: String, actual: String },

    // Ingestion errors (20-29)
    #[error("invalid metric point: {0}")]
    InvalidPoint(String),

    #[error("malformed metric line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    #[error("invalid value for {name}: {message}")]
    InvalidArgument { name: String, message: String },

    // Detection errors (30-39)
    #[error("insufficient data for {series}: {have} observations (need {need})")]
    InsufficientData {
        series: String,
        have: usize,
        need: usize,
    },

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Model errors (40-49)
    #[error("model training failed: {0}")]
    Training(String),

    #[error("model for {kind} is unusable: {message}")]
    ModelCorrupted { kind: String, message: String },

    // Storage errors (50-59)
    #[error("storage error: {0}")]
    Storage(String),

    #[error("anomaly not found: {id}")]
    AnomalyNotFound { id: String },

    #[error("baseline schema mismatch: supported up to v{supported}, found v{found}")]
    BaselineSchema { supported: u32, found: u32 },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable error code.
    ///
    /// - 10-19: configuration
    /// - 20-29: ingestion
    /// - 30-39: detection
    /// - 40-49: model
    /// - 50-59: storage
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig { .. } => 11,
            Error::ConfigVersion { .. } => 12,
            Error::InvalidPoint(_) => 20,
            Error::MalformedLine { .. } => 21,
            Error::InvalidArgument { .. } => 22,
            Error::InsufficientData { .. } => 30,
            Error::NumericalInstability(_) => 31,
            Error::Training(_) => 40,
            Error::ModelCorrupted { .. } => 41,
            Error::Storage(_) => 50,
            Error::AnomalyNotFound { .. } => 51,
            Error::BaselineSchema { .. } => 52,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } | Error::ConfigVersion { .. } => {
                ErrorCategory::Config
            }
            Error::InvalidPoint(_) | Error::MalformedLine { .. } | Error::InvalidArgument { .. } => {
                ErrorCategory::Ingestion
            }
            Error::InsufficientData { .. } | Error::NumericalInstability(_) => {
                ErrorCategory::Detection
            }
            Error::Training(_) | Error::ModelCorrupted { .. } => ErrorCategory::Model,
            Error::Storage(_) | Error::AnomalyNotFound { .. } | Error::BaselineSchema { .. } => {
                ErrorCategory::Storage
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether retrying or fixing input can resolve the error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::ConfigVersion { .. } | Error::AnomalyNotFound { .. } | Error::BaselineSchema { .. }
        )
    }

    /// Suggested follow-up for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => SuggestedAction::RunCheck,
            Error::ConfigVersion { .. } => SuggestedAction::ResetConfig,
            Error::InvalidPoint(_) | Error::MalformedLine { .. } | Error::InvalidArgument { .. } => {
                SuggestedAction::FixInput
            }
            Error::InsufficientData { .. } => SuggestedAction::RefreshBaseline,
            Error::NumericalInstability(_) => SuggestedAction::Skip,
            Error::Training(_) => SuggestedAction::Retry,
            Error::ModelCorrupted { .. } => SuggestedAction::ManualIntervention,
            Error::Storage(_) | Error::Io(_) => SuggestedAction::Retry,
            Error::AnomalyNotFound { .. } => SuggestedAction::Abort,
            Error::BaselineSchema { .. } => SuggestedAction::Abort,
            Error::Json(_) => SuggestedAction::FixInput,
        }
    }

    /// Human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidConfig { .. } => {
                "Run 'dw-core config validate' to see which setting is wrong."
            }
            Error::ConfigVersion { .. } => {
                "The config file was written for another driftwatch version. Regenerate it with 'dw-core config show > driftwatch.json'."
            }
            Error::InvalidPoint(_) => {
                "Metric values must be finite and names must be non-empty ASCII identifiers."
            }
            Error::MalformedLine { .. } => {
                "Each input line must be one JSON object with at least 'name' and 'value'."
            }
            Error::InvalidArgument { .. } => "Run the command with --help to see accepted formats.",
            Error::InsufficientData { .. } => {
                "Keep ingesting; a baseline is built once enough observations exist in the window."
            }
            Error::NumericalInstability(_) => {
                "The series is degenerate (constant or extreme). The point was skipped."
            }
            Error::Training(_) => "Retry training after more history has been ingested.",
            Error::ModelCorrupted { .. } => {
                "Delete the stored model with 'dw-core train --kind <kind>' to rebuild it."
            }
            Error::Storage(_) => {
                "Another driftwatch process may hold the database. Retry, or point --db elsewhere."
            }
            Error::AnomalyNotFound { .. } => {
                "List known anomalies with 'dw-core anomalies list'."
            }
            Error::BaselineSchema { .. } => {
                "The export was produced by a newer driftwatch. Upgrade before importing."
            }
            Error::Io(_) => "Check file paths, permissions and free disk space.",
            Error::Json(_) => "Check the JSON syntax of the input (e.g. with 'jq .').",
        }
    }

    /// Short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Config => "Configuration Error",
            ErrorCategory::Ingestion => "Invalid Input",
            ErrorCategory::Detection => "Detection Error",
            ErrorCategory::Model => "Model Error",
            ErrorCategory::Storage => "Storage Error",
            ErrorCategory::Io => "I/O Error",
        }
    }

    /// Multi-line rendering for terminals.
    pub fn render_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
    pub suggested_action: SuggestedAction,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();
        match err {
            Error::InvalidConfig { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::MalformedLine { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::InvalidArgument { name, .. } => {
                context.insert("argument".to_string(), serde_json::json!(name));
            }
            Error::InsufficientData { series, have, need } => {
                context.insert("series".to_string(), serde_json::json!(series));
                context.insert("have".to_string(), serde_json::json!(have));
                context.insert("need".to_string(), serde_json::json!(need));
            }
            Error::AnomalyNotFound { id } => {
                context.insert("anomaly_id".to_string(), serde_json::json!(id));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_category_ranges() {
        let cases: Vec<(Error, ErrorCategory, std::ops::Range<u32>)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config, 10..20),
            (Error::InvalidPoint("nan".into()), ErrorCategory::Ingestion, 20..30),
            (
                Error::InsufficientData {
                    series: "cpu@a".into(),
                    have: 3,
                    need: 10,
                },
                ErrorCategory::Detection,
                30..40,
            ),
            (Error::Training("x".into()), ErrorCategory::Model, 40..50),
            (Error::Storage("locked".into()), ErrorCategory::Storage, 50..60),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")),
                ErrorCategory::Io,
                60..70,
            ),
        ];
        for (err, cat, range) in cases {
            assert_eq!(err.category(), cat);
            assert!(range.contains(&err.code()), "{} -> {}", err, err.code());
        }
    }

    #[test]
    fn structured_error_includes_context() {
        let err = Error::InsufficientData {
            series: "cpu@web-1".into(),
            have: 4,
            need: 10,
        };
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 30);
        assert_eq!(structured.suggested_action, SuggestedAction::RefreshBaseline);
        assert_eq!(structured.context["series"], "cpu@web-1");

        let json = structured.to_json();
        assert!(json.contains(r#""category":"detection""#));
    }

    #[test]
    fn invalid_argument_names_the_flag() {
        let err = Error::InvalidArgument {
            name: "--since".into(),
            message: "out of range".into(),
        };
        assert_eq!(err.code(), 22);
        assert_eq!(err.category(), ErrorCategory::Ingestion);
        let structured = StructuredError::from(&err);
        assert_eq!(structured.context["argument"], "--since");
        assert_eq!(structured.suggested_action, SuggestedAction::FixInput);
    }

    #[test]
    fn schema_errors_are_not_recoverable() {
        let err = Error::BaselineSchema {
            supported: 1,
            found: 9,
        };
        assert!(!err.is_recoverable());
        assert!(Error::Storage("busy".into()).is_recoverable());
    }

    #[test]
    fn render_human_has_headline_and_fix() {
        let out = Error::AnomalyNotFound { id: "abc".into() }.render_human();
        assert!(out.starts_with("✗ Storage Error"));
        assert!(out.contains("Fix: "));
    }
}
