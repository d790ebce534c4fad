//! driftwatch common types, IDs, and errors.
//!
//! Shared by the config, math-consuming core, and CLI layers:
//! - Series and anomaly identity types
//! - Metric kinds and baseline windows
//! - Unified error type with stable codes
//! - Output format selection

pub mod error;
pub mod id;
pub mod metric;
pub mod output;

pub use error::{Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::{AnomalyId, SeriesKey, DEFAULT_SOURCE};
pub use metric::{MetricKind, TimeWindow};
pub use output::OutputFormat;

/// Schema version stamped on persisted baselines and exports.
pub const SCHEMA_VERSION: u32 = 1;
