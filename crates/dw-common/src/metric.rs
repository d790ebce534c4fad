//! Metric classification and baseline windows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric type; selects the domain heuristics and the ML model a point is
/// scored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Network,
    Performance,
    Security,
    Generic,
}

const SECURITY_KEYWORDS: &[&str] = &[
    "auth", "login", "denied", "firewall", "failed", "intrusion", "blocked", "privilege",
];
const NETWORK_KEYWORDS: &[&str] = &[
    "net", "bytes", "packet", "conn", "socket", "tcp", "udp", "dns", "bandwidth", "traffic",
];
const PERFORMANCE_KEYWORDS: &[&str] = &[
    "cpu", "mem", "disk", "latency", "load", "response_time", "iops", "util", "swap", "queue",
];

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Network,
        MetricKind::Performance,
        MetricKind::Security,
        MetricKind::Generic,
    ];

    /// Infer the kind from a metric name by keyword. Security wins ties.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(SECURITY_KEYWORDS) {
            MetricKind::Security
        } else if has(NETWORK_KEYWORDS) {
            MetricKind::Network
        } else if has(PERFORMANCE_KEYWORDS) {
            MetricKind::Performance
        } else {
            MetricKind::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Network => "network",
            MetricKind::Performance => "performance",
            MetricKind::Security => "security",
            MetricKind::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "network" | "net" => Some(MetricKind::Network),
            "performance" | "perf" => Some(MetricKind::Performance),
            "security" | "sec" => Some(MetricKind::Security),
            "generic" => Some(MetricKind::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trailing window a baseline summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
}

impl TimeWindow {
    pub fn seconds(&self) -> i64 {
        match self {
            TimeWindow::Hour => 3_600,
            TimeWindow::Day => 86_400,
            TimeWindow::Week => 604_800,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hour" | "1h" => Some(TimeWindow::Hour),
            "day" | "24h" | "1d" => Some(TimeWindow::Day),
            "week" | "7d" | "1w" => Some(TimeWindow::Week),
            _ => None,
        }
    }

    /// Windows long enough to expose hour-of-day / day-of-week structure.
    pub fn supports_seasonality(&self) -> bool {
        !matches!(self, TimeWindow::Hour)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_kind_from_name() {
        assert_eq!(MetricKind::infer("net.bytes_in"), MetricKind::Network);
        assert_eq!(MetricKind::infer("cpu.util"), MetricKind::Performance);
        assert_eq!(MetricKind::infer("api.latency_ms"), MetricKind::Performance);
        assert_eq!(MetricKind::infer("ssh.failed_logins"), MetricKind::Security);
        assert_eq!(MetricKind::infer("orders.count"), MetricKind::Generic);
    }

    #[test]
    fn security_takes_precedence() {
        // "conn" is a network keyword, "denied" a security one.
        assert_eq!(MetricKind::infer("conn.denied"), MetricKind::Security);
    }

    #[test]
    fn window_parse_and_seconds() {
        assert_eq!(TimeWindow::parse("24h"), Some(TimeWindow::Day));
        assert_eq!(TimeWindow::Week.seconds(), 7 * 86_400);
        assert!(!TimeWindow::Hour.supports_seasonality());
        assert_eq!(
            serde_json::to_string(&TimeWindow::Hour).unwrap(),
            "\"hour\""
        );
    }
}
