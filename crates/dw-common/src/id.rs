//! Identity types for metric series and anomaly records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source used when a point does not name one.
pub const DEFAULT_SOURCE: &str = "default";

/// Identifies one metric time series: a metric name observed from a source.
///
/// Displayed and parsed as `name@source`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub name: String,
    pub source: String,
}

impl SeriesKey {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        SeriesKey {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Parse `name@source`; a bare `name` uses the default source.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, source) = match s.rsplit_once('@') {
            Some((n, src)) => (n, src),
            None => (s, DEFAULT_SOURCE),
        };
        if name.is_empty() || source.is_empty() {
            return None;
        }
        Some(SeriesKey::new(name, source))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.source)
    }
}

/// Unique anomaly record identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyId(pub String);

impl AnomalyId {
    pub fn new() -> Self {
        AnomalyId(uuid::Uuid::new_v4().to_string())
    }

    /// Accepts only well-formed UUIDs.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| AnomalyId(u.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnomalyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnomalyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
