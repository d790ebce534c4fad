//! Metric ingestion: parsing and validation of raw observations.
//!
//! Input is one JSON object per line:
//!
//! ```text
//! {"name":"net.bytes_in","value":1234.0,"source":"web-1","timestamp":"2026-01-05T10:00:00Z"}
//! {"name":"cpu.util","value":41.5,"timestamp":1767607200}
//! ```
//!
//! `timestamp` is RFC 3339 or epoch seconds; missing means "now". `kind`
//! is inferred from the name when absent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dw_common::{Error, MetricKind, Result, SeriesKey, DEFAULT_SOURCE};
use dw_config::IngestionSettings;
use serde::{Deserialize, Serialize};

use crate::span;

/// Timestamp as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    EpochSeconds(f64),
    Text(String),
}

/// An observation before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MetricKind>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl RawPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            source: None,
            timestamp: None,
            kind: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(RawTimestamp::Text(ts.to_rfc3339()));
        self
    }

    pub fn with_kind(mut self, kind: MetricKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A validated observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub source: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn series(&self) -> SeriesKey {
        SeriesKey::new(&self.name, &self.source)
    }
}

/// Why a point in a batch was refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    /// Position in the batch (0-based) or input line (1-based) for files.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: Vec<MetricPoint>,
    pub rejected: Vec<Rejection>,
}

fn valid_identifier(s: &str, max_len: usize) -> std::result::Result<(), String> {
    if s.is_empty() {
        return Err("must not be empty".to_string());
    }
    if s.chars().count() > max_len {
        return Err(format!("longer than {} characters", max_len));
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')))
    {
        return Err(format!("contains invalid character {:?}", c));
    }
    Ok(())
}

fn resolve_timestamp(raw: Option<&RawTimestamp>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(now),
        Some(RawTimestamp::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                // Numeric strings are accepted as epoch seconds.
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| Error::InvalidPoint(format!("unparseable timestamp {:?}", s)))
                    .and_then(from_epoch)
            }),
        Some(RawTimestamp::EpochSeconds(secs)) => from_epoch(*secs),
    }
}

fn from_epoch(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(Error::InvalidPoint("non-finite epoch timestamp".to_string()));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| Error::InvalidPoint(format!("epoch timestamp {} out of range", secs)))
}

/// Validate a raw point against the ingestion rules.
pub fn validate(raw: RawPoint, now: DateTime<Utc>, cfg: &IngestionSettings) -> Result<MetricPoint> {
    valid_identifier(&raw.name, cfg.max_name_len)
        .map_err(|e| Error::InvalidPoint(format!("metric name {:?} {}", raw.name, e)))?;

    let source = raw
        .source
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    valid_identifier(&source, cfg.max_name_len)
        .map_err(|e| Error::InvalidPoint(format!("source {:?} {}", source, e)))?;

    if !raw.value.is_finite() {
        return Err(Error::InvalidPoint(format!(
            "value for {} is not finite",
            raw.name
        )));
    }

    let timestamp = resolve_timestamp(raw.timestamp.as_ref(), now)?;
    if timestamp > span::after(now, cfg.max_future_skew_secs) {
        return Err(Error::InvalidPoint(format!(
            "timestamp {} is more than {}s in the future",
            timestamp.to_rfc3339(),
            cfg.max_future_skew_secs
        )));
    }
    if timestamp < span::before(now, cfg.max_age_secs) {
        return Err(Error::InvalidPoint(format!(
            "timestamp {} is older than {}s",
            timestamp.to_rfc3339(),
            cfg.max_age_secs
        )));
    }

    let kind = raw.kind.unwrap_or_else(|| MetricKind::infer(&raw.name));
    Ok(MetricPoint {
        name: raw.name,
        source,
        value: raw.value,
        timestamp,
        kind,
        tags: raw.tags,
    })
}

/// Blank lines and `#` comments carry no point.
pub fn is_skippable(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

/// Parse one JSON line into a raw point.
pub fn parse_line(line: &str) -> Result<RawPoint> {
    parse_numbered_line(line, 1)
}

/// Parse one JSON line, reporting `line_no` on failure.
pub fn parse_numbered_line(line: &str, line_no: usize) -> Result<RawPoint> {
    serde_json::from_str::<RawPoint>(line.trim()).map_err(|e| Error::MalformedLine {
        line: line_no,
        message: e.to_string(),
    })
}

/// Validate a batch; one bad point never fails the batch.
pub fn ingest_batch(
    points: impl IntoIterator<Item = RawPoint>,
    now: DateTime<Utc>,
    cfg: &IngestionSettings,
) -> IngestReport {
    let mut report = IngestReport::default();
    for (index, raw) in points.into_iter().enumerate() {
        let name = raw.name.clone();
        match validate(raw, now, cfg) {
            Ok(point) => report.accepted.push(point),
            Err(e) => {
                tracing::debug!(
                    target: crate::logging::event_names::INGEST_REJECTED,
                    index,
                    metric = %name,
                    reason = %e,
                );
                report.rejected.push(Rejection {
                    index,
                    name: Some(name),
                    reason: e.to_string(),
                })
            }
        }
    }
    report
}
