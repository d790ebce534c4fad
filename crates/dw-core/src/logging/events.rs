//! Structured event definitions for logging.
//!
//! Events are plain tracing events whose target is one of
//! [`event_names`]. The JSONL layer stamps each with the run id, host id and
//! pipeline stage of the enclosing [`LogContext`] span.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Point parsing and validation.
    Ingest,
    /// Baseline fitting and seasonal detection.
    Baseline,
    /// Statistical, ML and heuristic scoring.
    Detect,
    /// Model training.
    Train,
    /// Long-running watch loop.
    Monitor,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Ingest => "ingest",
            Stage::Baseline => "baseline",
            Stage::Detect => "detect",
            Stage::Train => "train",
            Stage::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable event names, used as tracing targets.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const INGEST_ACCEPTED: &str = "ingest.accepted";
    pub const INGEST_REJECTED: &str = "ingest.rejected";
    pub const INGEST_BATCH: &str = "ingest.batch";

    pub const BASELINE_REFRESHED: &str = "baseline.refreshed";
    pub const BASELINE_INSUFFICIENT: &str = "baseline.insufficient";
    pub const BASELINE_SEASONAL: &str = "baseline.seasonal";
    pub const BASELINE_RESET: &str = "baseline.reset";
    pub const BASELINE_IMPORTED: &str = "baseline.imported";

    pub const DETECT_LEARNING: &str = "detect.learning";
    pub const DETECT_NORMAL: &str = "detect.normal";
    pub const DETECT_ANOMALY: &str = "detect.anomaly";
    pub const DETECT_FINDING: &str = "detect.finding";

    pub const MODEL_TRAINED: &str = "model.trained";
    pub const MODEL_SKIPPED: &str = "model.skipped";
    pub const MODEL_LOADED: &str = "model.loaded";
    pub const MODEL_ERROR: &str = "model.error";

    pub const STORE_OPENED: &str = "store.opened";
    pub const STORE_PRUNED: &str = "store.pruned";

    pub const MONITOR_TICK: &str = "monitor.tick";
    pub const MONITOR_STOPPED: &str = "monitor.stopped";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Context for generating log events with consistent run/host IDs.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Context for this process: fresh run id, machine host id.
    pub fn for_current_run() -> Self {
        Self::new(super::generate_run_id(), super::get_host_id())
    }

    /// Root span carrying the correlation ids; events emitted inside it
    /// inherit them in JSONL output.
    pub fn span(&self, stage: Stage) -> tracing::Span {
        tracing::info_span!(
            "dw",
            run_id = %self.run_id,
            host_id = %self.host_id,
            stage = stage.as_str()
        )
    }
}
