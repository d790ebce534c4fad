//! SQLite persistence for points, baselines, anomalies and models.
//!
//! Timestamps are stored as epoch milliseconds. Structured values
//! (baseline summaries, anomaly records, models) are stored as JSON text
//! next to the columns queries filter on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dw_common::{AnomalyId, MetricKind, SeriesKey, TimeWindow};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::baseline::BaselineSummary;
use crate::detect::{AnomalyRecord, Severity};
use crate::ingest::MetricPoint;

/// Database schema version, kept in `PRAGMA user_version`.
pub const STORE_SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    kind TEXT NOT NULL,
    value REAL NOT NULL,
    ts INTEGER NOT NULL,
    tags TEXT
);
CREATE INDEX IF NOT EXISTS idx_metrics_series_ts ON metrics(name, source, ts);
CREATE INDEX IF NOT EXISTS idx_metrics_kind_ts ON metrics(kind, ts);

CREATE TABLE IF NOT EXISTS baselines (
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    window TEXT NOT NULL,
    computed_at INTEGER NOT NULL,
    summary TEXT NOT NULL,
    PRIMARY KEY (name, source, window)
);

CREATE TABLE IF NOT EXISTS anomalies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    kind TEXT NOT NULL,
    value REAL NOT NULL,
    score REAL NOT NULL,
    severity TEXT NOT NULL,
    severity_rank INTEGER NOT NULL,
    ts INTEGER NOT NULL,
    detected_at INTEGER NOT NULL,
    label INTEGER,
    record TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_anomalies_ts ON anomalies(ts);
CREATE INDEX IF NOT EXISTS idx_anomalies_kind_label ON anomalies(kind, label);

CREATE TABLE IF NOT EXISTS models (
    kind TEXT NOT NULL,
    model_type TEXT NOT NULL,
    trained_at INTEGER NOT NULL,
    n_samples INTEGER NOT NULL,
    model TEXT NOT NULL,
    PRIMARY KEY (kind, model_type)
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("database schema v{found} is newer than supported v{supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for dw_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => dw_common::Error::Io(e),
            other => dw_common::Error::Storage(other.to_string()),
        }
    }
}

/// One series as seen in the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub series: SeriesKey,
    pub kind: MetricKind,
    pub count: usize,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Points of one series, ascending by time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesHistory {
    pub series: SeriesKey,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

/// Anomaly listing criteria. Empty filter lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub since: Option<DateTime<Utc>>,
    /// Minimum severity.
    pub severity: Option<Severity>,
    pub metric: Option<String>,
    pub source: Option<String>,
    pub kind: Option<MetricKind>,
    pub unlabeled_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct StoredModel {
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
    pub json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub kind: MetricKind,
    pub model_type: String,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub points: usize,
    pub series: usize,
    pub baselines: usize,
    pub anomalies: usize,
    pub labeled_anomalies: usize,
    pub models: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_point: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_point: Option<DateTime<Utc>>,
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {} out of range", ms)))
}

fn parse_kind(s: &str) -> StoreResult<MetricKind> {
    MetricKind::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown metric kind {:?}", s)))
}

fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1)
}

/// Handle on the engine database.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    /// Open (creating if needed) a database file.
    pub fn open(path: &Path, busy_timeout_ms: u64) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        let store = Store {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        tracing::debug!(
            target: crate::logging::event_names::STORE_OPENED,
            path = %path.display(),
        );
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Store {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> StoreResult<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > STORE_SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found: version,
                supported: STORE_SCHEMA_VERSION,
            });
        }
        self.conn.execute_batch(SCHEMA)?;
        self.conn
            .pragma_update(None, "user_version", STORE_SCHEMA_VERSION)?;
        Ok(())
    }

    // ---- points ----

    pub fn insert_point(&self, point: &MetricPoint) -> StoreResult<()> {
        let tags = if point.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&point.tags)?)
        };
        self.conn.execute(
            "INSERT INTO metrics (name, source, kind, value, ts, tags) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                point.name,
                point.source,
                point.kind.as_str(),
                point.value,
                to_millis(point.timestamp),
                tags
            ],
        )?;
        Ok(())
    }

    /// Insert many points in one transaction.
    pub fn insert_points(&self, points: &[MetricPoint]) -> StoreResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for point in points {
            self.insert_point(point)?;
        }
        tx.commit()?;
        Ok(points.len())
    }

    fn read_points(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<MetricPoint>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut points = Vec::new();
        for row in rows {
            let (name, source, kind, value, ts, tags) = row?;
            let tags: BTreeMap<String, String> = match tags {
                Some(t) => serde_json::from_str(&t)?,
                None => BTreeMap::new(),
            };
            points.push(MetricPoint {
                name,
                source,
                value,
                timestamp: from_millis(ts)?,
                kind: parse_kind(&kind)?,
                tags,
            });
        }
        // Queries select newest first so LIMIT keeps the most recent.
        points.reverse();
        Ok(points)
    }

    /// Points of `series` in `[from, to)`, ascending, keeping the most
    /// recent `limit`.
    pub fn points_in_range(
        &self,
        series: &SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<MetricPoint>> {
        self.read_points(
            "SELECT name, source, kind, value, ts, tags FROM metrics
             WHERE name = ?1 AND source = ?2 AND ts >= ?3 AND ts < ?4
             ORDER BY ts DESC, id DESC LIMIT ?5",
            &[
                &series.name,
                &series.source,
                &to_millis(from),
                &to_millis(to),
                &sql_limit(limit),
            ],
        )
    }

    pub fn count_points_in_range(
        &self,
        series: &SeriesKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE name = ?1 AND source = ?2 AND ts >= ?3 AND ts < ?4",
            params![series.name, series.source, to_millis(from), to_millis(to)],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// The last `limit` points of `series` strictly before `before`, ascending.
    pub fn recent_points(
        &self,
        series: &SeriesKey,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<MetricPoint>> {
        self.read_points(
            "SELECT name, source, kind, value, ts, tags FROM metrics
             WHERE name = ?1 AND source = ?2 AND ts < ?3
             ORDER BY ts DESC, id DESC LIMIT ?4",
            &[
                &series.name,
                &series.source,
                &to_millis(before),
                &sql_limit(Some(limit)),
            ],
        )
    }

    pub fn series_list(&self) -> StoreResult<Vec<SeriesInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, source, MAX(kind), COUNT(*), MIN(ts), MAX(ts) FROM metrics
             GROUP BY name, source ORDER BY name, source",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (name, source, kind, count, first, last) = row?;
            out.push(SeriesInfo {
                series: SeriesKey::new(name, source),
                kind: parse_kind(&kind)?,
                count: count as usize,
                first: from_millis(first)?,
                last: from_millis(last)?,
            });
        }
        Ok(out)
    }

    pub fn count_points_by_kind_since(
        &self,
        kind: MetricKind,
        since: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE kind = ?1 AND ts >= ?2",
            params![kind.as_str(), to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// The most recent `limit` points of one kind since `since`, grouped by
    /// series, each ascending.
    pub fn points_by_kind_since(
        &self,
        kind: MetricKind,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<SeriesHistory>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, source, value, ts FROM metrics
             WHERE kind = ?1 AND ts >= ?2
             ORDER BY ts DESC, id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![kind.as_str(), to_millis(since), sql_limit(Some(limit))],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;
        let mut grouped: BTreeMap<SeriesKey, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for row in rows {
            let (name, source, value, ts) = row?;
            grouped
                .entry(SeriesKey::new(name, source))
                .or_default()
                .push((from_millis(ts)?, value));
        }
        Ok(grouped
            .into_iter()
            .map(|(series, mut points)| {
                points.reverse();
                SeriesHistory { series, points }
            })
            .collect())
    }

    /// Delete raw points older than `cutoff`; returns rows removed.
    pub fn prune_points_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let n = self
            .conn
            .execute("DELETE FROM metrics WHERE ts < ?1", params![to_millis(cutoff)])?;
        Ok(n)
    }

    // ---- baselines ----

    pub fn save_baseline(&self, series: &SeriesKey, summary: &BaselineSummary) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO baselines (name, source, window, computed_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name, source, window) DO UPDATE SET
                computed_at = excluded.computed_at, summary = excluded.summary",
            params![
                series.name,
                series.source,
                summary.window.as_str(),
                to_millis(summary.computed_at),
                serde_json::to_string(summary)?
            ],
        )?;
        Ok(())
    }

    pub fn load_baseline(
        &self,
        series: &SeriesKey,
        window: TimeWindow,
    ) -> StoreResult<Option<BaselineSummary>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT summary FROM baselines WHERE name = ?1 AND source = ?2 AND window = ?3",
                params![series.name, series.source, window.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    /// Every stored baseline of one series.
    pub fn load_baselines(&self, series: &SeriesKey) -> StoreResult<Vec<BaselineSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT summary FROM baselines WHERE name = ?1 AND source = ?2")?;
        let rows = stmt.query_map(params![series.name, series.source], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for json in rows {
            out.push(serde_json::from_str(&json?)?);
        }
        Ok(out)
    }

    pub fn all_baselines(&self) -> StoreResult<Vec<(SeriesKey, BaselineSummary)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, source, summary FROM baselines ORDER BY name, source, window")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (name, source, json) = row?;
            out.push((SeriesKey::new(name, source), serde_json::from_str(&json)?));
        }
        Ok(out)
    }

    pub fn delete_baseline(&self, series: &SeriesKey, window: TimeWindow) -> StoreResult<bool> {
        let n = self.conn.execute(
            "DELETE FROM baselines WHERE name = ?1 AND source = ?2 AND window = ?3",
            params![series.name, series.source, window.as_str()],
        )?;
        Ok(n > 0)
    }

    /// Delete baselines of one series, or all when `series` is `None`.
    pub fn delete_baselines(&self, series: Option<&SeriesKey>) -> StoreResult<usize> {
        let n = match series {
            Some(s) => self.conn.execute(
                "DELETE FROM baselines WHERE name = ?1 AND source = ?2",
                params![s.name, s.source],
            )?,
            None => self.conn.execute("DELETE FROM baselines", [])?,
        };
        Ok(n)
    }

    // ---- anomalies ----

    pub fn insert_anomaly(&self, record: &AnomalyRecord) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO anomalies
                (id, name, source, kind, value, score, severity, severity_rank, ts, detected_at, label, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.as_str(),
                record.series.name,
                record.series.source,
                record.kind.as_str(),
                record.value,
                record.score,
                record.severity.as_str(),
                record.severity.rank(),
                to_millis(record.timestamp),
                to_millis(record.detected_at),
                record.label,
                serde_json::to_string(record)?
            ],
        )?;
        Ok(())
    }

    fn read_records(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<AnomalyRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for json in rows {
            out.push(serde_json::from_str(&json?)?);
        }
        Ok(out)
    }

    pub fn list_anomalies(&self, filter: &AnomalyFilter) -> StoreResult<Vec<AnomalyRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = filter.since {
            clauses.push("ts >= ?");
            args.push(Box::new(to_millis(since)));
        }
        if let Some(sev) = filter.severity {
            clauses.push("severity_rank >= ?");
            args.push(Box::new(sev.rank()));
        }
        if let Some(metric) = &filter.metric {
            clauses.push("name = ?");
            args.push(Box::new(metric.clone()));
        }
        if let Some(source) = &filter.source {
            clauses.push("source = ?");
            args.push(Box::new(source.clone()));
        }
        if let Some(kind) = filter.kind {
            clauses.push("kind = ?");
            args.push(Box::new(kind.as_str()));
        }
        if filter.unlabeled_only {
            clauses.push("label IS NULL");
        }

        let mut sql = String::from("SELECT record FROM anomalies");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ts DESC, detected_at DESC LIMIT ?");
        args.push(Box::new(sql_limit(filter.limit)));

        let refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        self.read_records(&sql, &refs)
    }

    pub fn get_anomaly(&self, id: &AnomalyId) -> StoreResult<Option<AnomalyRecord>> {
        Ok(self
            .read_records("SELECT record FROM anomalies WHERE id = ?1", &[&id.as_str()])?
            .into_iter()
            .next())
    }

    /// Record analyst feedback. Returns `false` when no such anomaly exists.
    pub fn label_anomaly(&self, id: &AnomalyId, label: bool) -> StoreResult<bool> {
        let Some(mut record) = self.get_anomaly(id)? else {
            return Ok(false);
        };
        record.label = Some(label);
        let n = self.conn.execute(
            "UPDATE anomalies SET label = ?1, record = ?2 WHERE id = ?3",
            params![label, serde_json::to_string(&record)?, id.as_str()],
        )?;
        Ok(n > 0)
    }

    /// Labeled anomalies of one kind, oldest first.
    pub fn labeled_anomalies(&self, kind: MetricKind) -> StoreResult<Vec<AnomalyRecord>> {
        self.read_records(
            "SELECT record FROM anomalies WHERE kind = ?1 AND label IS NOT NULL ORDER BY ts ASC",
            &[&kind.as_str()],
        )
    }

    // ---- models ----

    pub fn save_model(
        &self,
        kind: MetricKind,
        model_type: &str,
        trained_at: DateTime<Utc>,
        n_samples: usize,
        json: &str,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO models (kind, model_type, trained_at, n_samples, model)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(kind, model_type) DO UPDATE SET
                trained_at = excluded.trained_at,
                n_samples = excluded.n_samples,
                model = excluded.model",
            params![
                kind.as_str(),
                model_type,
                to_millis(trained_at),
                n_samples as i64,
                json
            ],
        )?;
        Ok(())
    }

    pub fn load_model(&self, kind: MetricKind, model_type: &str) -> StoreResult<Option<StoredModel>> {
        let row: Option<(i64, i64, String)> = self
            .conn
            .query_row(
                "SELECT trained_at, n_samples, model FROM models WHERE kind = ?1 AND model_type = ?2",
                params![kind.as_str(), model_type],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(trained_at, n, json)| {
            Ok(StoredModel {
                trained_at: from_millis(trained_at)?,
                n_samples: n as usize,
                json,
            })
        })
        .transpose()
    }

    pub fn list_models(&self) -> StoreResult<Vec<ModelInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, model_type, trained_at, n_samples FROM models ORDER BY kind, model_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (kind, model_type, trained_at, n) = row?;
            out.push(ModelInfo {
                kind: parse_kind(&kind)?,
                model_type,
                trained_at: from_millis(trained_at)?,
                n_samples: n as usize,
            });
        }
        Ok(out)
    }

    // ---- meta ----

    pub fn get_meta(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let count = |sql: &str| -> StoreResult<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(ts), MAX(ts) FROM metrics",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            points: count("SELECT COUNT(*) FROM metrics")?,
            series: count("SELECT COUNT(*) FROM (SELECT 1 FROM metrics GROUP BY name, source)")?,
            baselines: count("SELECT COUNT(*) FROM baselines")?,
            anomalies: count("SELECT COUNT(*) FROM anomalies")?,
            labeled_anomalies: count("SELECT COUNT(*) FROM anomalies WHERE label IS NOT NULL")?,
            models: count("SELECT COUNT(*) FROM models")?,
            oldest_point: oldest.map(from_millis).transpose()?,
            newest_point: newest.map(from_millis).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    fn point(name: &str, value: f64, ts: DateTime<Utc>) -> MetricPoint {
        MetricPoint {
            name: name.to_string(),
            source: "web-1".to_string(),
            value,
            timestamp: ts,
            kind: MetricKind::infer(name),
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn points_range_and_recent() {
        let store = Store::open_in_memory().unwrap();
        let pts: Vec<_> = (0..10)
            .map(|i| point("cpu.util", i as f64, t0() + Duration::minutes(i)))
            .collect();
        store.insert_points(&pts).unwrap();
        let key = SeriesKey::new("cpu.util", "web-1");

        let range = store
            .points_in_range(&key, t0() + Duration::minutes(2), t0() + Duration::minutes(5), None)
            .unwrap();
        assert_eq!(range.iter().map(|p| p.value).collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);

        let limited = store
            .points_in_range(&key, t0(), t0() + Duration::hours(1), Some(3))
            .unwrap();
        assert_eq!(limited.iter().map(|p| p.value).collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);

        let recent = store.recent_points(&key, t0() + Duration::minutes(4), 2).unwrap();
        assert_eq!(recent.iter().map(|p| p.value).collect::<Vec<_>>(), vec![2.0, 3.0]);
        assert_eq!(recent[0].kind, MetricKind::Performance);
    }

    #[test]
    fn tags_survive_storage() {
        let store = Store::open_in_memory().unwrap();
        let mut p = point("net.bytes_in", 1.0, t0());
        p.tags.insert("dc".into(), "eu".into());
        store.insert_point(&p).unwrap();
        let back = store
            .recent_points(&p.series(), t0() + Duration::seconds(1), 1)
            .unwrap();
        assert_eq!(back, vec![p]);
    }

    #[test]
    fn series_and_kind_queries() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert_point(&point("net.bytes_in", i as f64, t0() + Duration::minutes(i)))
                .unwrap();
            store
                .insert_point(&point("net.pkts", i as f64, t0() + Duration::minutes(i)))
                .unwrap();
        }
        store.insert_point(&point("cpu.util", 1.0, t0())).unwrap();

        let series = store.series_list().unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].series.name, "cpu.util");
        assert_eq!(series[1].count, 5);

        assert_eq!(
            store
                .count_points_by_kind_since(MetricKind::Network, t0() + Duration::minutes(3))
                .unwrap(),
            4
        );
        let hist = store
            .points_by_kind_since(MetricKind::Network, t0(), 6)
            .unwrap();
        assert_eq!(hist.len(), 2);
        let total: usize = hist.iter().map(|h| h.points.len()).sum();
        assert_eq!(total, 6);
        assert!(hist[0].points.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn prune_removes_old_points() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..4 {
            store
                .insert_point(&point("x", 0.0, t0() + Duration::days(i)))
                .unwrap();
        }
        assert_eq!(store.prune_points_before(t0() + Duration::days(2)).unwrap(), 2);
        assert_eq!(store.stats().unwrap().points, 2);
    }

    #[test]
    fn meta_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_meta("k").unwrap(), None);
        store.set_meta("k", "1").unwrap();
        store.set_meta("k", "2").unwrap();
        assert_eq!(store.get_meta("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn models_upsert() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_model(MetricKind::Network, "isolation_forest", t0(), 10, "{}")
            .unwrap();
        store
            .save_model(MetricKind::Network, "isolation_forest", t0() + Duration::hours(1), 20, "{\"a\":1}")
            .unwrap();
        let m = store
            .load_model(MetricKind::Network, "isolation_forest")
            .unwrap()
            .unwrap();
        assert_eq!(m.n_samples, 20);
        assert_eq!(m.json, "{\"a\":1}");
        assert!(store.load_model(MetricKind::Security, "isolation_forest").unwrap().is_none());
        assert_eq!(store.list_models().unwrap().len(), 1);
    }

    #[test]
    fn file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dw.db");
        {
            let store = Store::open(&path, 1000).unwrap();
            store.insert_point(&point("x", 1.0, t0())).unwrap();
        }
        let store = Store::open(&path, 1000).unwrap();
        assert_eq!(store.stats().unwrap().points, 1);
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dw.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", 99).unwrap();
        }
        assert!(matches!(
            Store::open(&path, 1000),
            Err(StoreError::SchemaTooNew { found: 99, .. })
        ));
    }
}
