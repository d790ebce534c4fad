//! driftwatch core library
//!
//! This library provides the anomaly detection engine:
//! - Metric ingestion and validation
//! - Rolling baselines with seasonal profiles
//! - Statistical outlier tests, ML models and domain heuristics
//! - The orchestrating engine and its SQLite store
//! - Monitor loop primitives, structured logging and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod baseline;
pub mod detect;
pub mod engine;
pub mod exit_codes;
pub mod ingest;
pub mod logging;
pub mod ml;
pub mod monitor;
pub mod span;
pub mod store;

pub use detect::{AnomalyRecord, DetectionOutcome, Severity};
pub use engine::{AnomalyEngine, BatchReport, EngineStats, MaintenanceReport};
pub use ingest::{MetricPoint, RawPoint};
pub use store::{AnomalyFilter, Store};
