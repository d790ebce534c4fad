//! Structured logging for driftwatch.
//!
//! Two output modes, both on stderr so stdout stays reserved for command
//! payloads and the `watch` anomaly stream:
//! - human-readable console lines for interactive use
//! - JSONL for pipelines and log shippers
//!
//! ```ignore
//! use dw_core::logging::{init_logging, LogConfig, LogContext, LogOverrides, Stage, event_names};
//!
//! init_logging(&LogConfig::from_env(LogOverrides::default()));
//! let ctx = LogContext::for_current_run();
//! let _span = ctx.span(Stage::Detect).entered();
//! tracing::info!(target: event_names::DETECT_ANOMALY, series = "cpu@web-1", score = 0.93);
//! ```

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel, LogOverrides};
pub use events::{event_names, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;

use sha2::{Digest, Sha256};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LogConfig) {
    // Event names are used as targets, so the filter is a global level
    // rather than a per-crate directive.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .parse_lossy("");

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(use_ansi);
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };
    // A subscriber already installed (tests, embedding) keeps precedence.
    let _ = result;
}

/// Short random id distinguishing one CLI invocation or monitor session.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("run-{}", &uuid[..12])
}

/// Stable host identifier: machine-id prefix, else a hash of the hostname.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 && id.is_ascii() {
            return format!("host-{}", &id[..8]);
        }
    }
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        let digest = hex::encode(Sha256::digest(hostname.as_bytes()));
        return format!("host-{}", &digest[..8]);
    }
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("host-{}", &uuid[..8])
}

/// Emit a tracing event stamped with a [`LogContext`]. The level is one of
/// `TRACE`, `DEBUG`, `INFO`, `WARN` or `ERROR`.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::MODEL_TRAINED, Stage::Train, "trained",
///     kind = "network", n_samples = 512);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, $level:ident, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)* $(,)?) => {
        tracing::event!(
            target: $event,
            tracing::Level::$level,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_short_and_unique() {
        let id1 = generate_run_id();
        let id2 = generate_run_id();
        assert!(id1.starts_with("run-"));
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 16);
    }

    #[test]
    fn host_id_has_fixed_shape() {
        let host_id = get_host_id();
        assert!(host_id.starts_with("host-"));
        assert_eq!(host_id.len(), 13);
    }

    #[test]
    fn second_init_is_ignored() {
        let cfg = LogConfig::default().with_level(LogLevel::Off);
        init_logging(&cfg);
        init_logging(&cfg.with_format(LogFormat::Jsonl));
    }
}
