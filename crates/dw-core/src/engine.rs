//! The detection engine.
//!
//! Per point: validate, refresh the series' baselines when due, score
//! against history that excludes the point (statistical tests, ML models,
//! domain rules), combine, then persist the point and any anomaly record.

use chrono::{DateTime, Utc};
use dw_common::{AnomalyId, Error, MetricKind, Result, SeriesKey};
use dw_config::{default_db_path, EngineConfig, ScoringSettings};
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineManager, BaselineMetadata, BaselineSummary, SeasonalProfile};
use crate::detect::heuristics::{self, HeuristicInput};
use crate::detect::statistical::{self, StatisticalReport};
use crate::detect::{AnomalyRecord, DetectionOutcome, Finding, Severity};
use crate::ingest::{ingest_batch, validate, MetricPoint, RawPoint, Rejection};
use crate::logging::event_names;
use crate::ml::{self, MlDetector, MlScore, TrainOutcome};
use crate::span;
use crate::store::{AnomalyFilter, ModelInfo, Store, StoreStats};

/// Combined decision for one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f64,
    pub is_anomaly: bool,
    pub severity: Severity,
    pub critical: bool,
}

/// Weighted blend of the detector scores plus heuristic boosts.
///
/// The ML weight drops out when there is no ML score. The point is
/// anomalous at or above the threshold, on any critical finding, or when
/// every conclusive statistical test flagged it with enough votes.
pub fn combine(
    report: &StatisticalReport,
    ml: Option<&MlScore>,
    findings: &[Finding],
    cfg: &ScoringSettings,
) -> Verdict {
    let base = match ml {
        Some(m) if cfg.statistical_weight + cfg.ml_weight > 0.0 => {
            (cfg.statistical_weight * report.score + cfg.ml_weight * m.score)
                / (cfg.statistical_weight + cfg.ml_weight)
        }
        _ => report.score,
    };
    let boosts: f64 = findings.iter().map(|f| f.boost).sum();
    let score = (base + boosts).clamp(0.0, 1.0);

    let critical = findings.iter().any(|f| f.critical);
    let unanimous = report.is_unanimous() && report.votes >= cfg.unanimous_min_votes;
    let is_anomaly = score >= cfg.anomaly_threshold || critical || unanimous;

    let mut severity = Severity::from_score(score);
    if critical {
        severity = severity.max(Severity::High);
    }
    Verdict {
        score,
        is_anomaly,
        severity,
        critical,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub learning: usize,
    pub normal: usize,
    pub anomalies: Vec<AnomalyRecord>,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub points_pruned: usize,
    pub baselines_refreshed: usize,
    pub models: Vec<TrainOutcome>,
}

impl MaintenanceReport {
    pub fn models_trained(&self) -> usize {
        self.models
            .iter()
            .filter(|m| matches!(m, TrainOutcome::Trained { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub store: StoreStats,
    pub models: Vec<ModelInfo>,
    pub baseline_metadata: BaselineMetadata,
}

pub struct AnomalyEngine {
    config: EngineConfig,
    store: Store,
    baselines: BaselineManager,
    ml: MlDetector,
}

impl std::fmt::Debug for AnomalyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyEngine")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AnomalyEngine {
    /// Build an engine over an open store and load persisted models.
    pub fn new(config: EngineConfig, store: Store) -> Result<Self> {
        let mut ml = MlDetector::new(config.ml.clone());
        ml.load(&store)?;
        Ok(Self {
            baselines: BaselineManager::new(config.baseline.clone()),
            ml,
            store,
            config,
        })
    }

    /// Open the configured database (or the default data path).
    pub fn open(config: EngineConfig) -> Result<Self> {
        let path = config
            .storage
            .db_path
            .clone()
            .or_else(default_db_path)
            .ok_or_else(|| {
                Error::Config("no data directory available; set storage.db_path or --db".to_string())
            })?;
        let store = Store::open(&path, config.storage.busy_timeout_ms)?;
        Self::new(config, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Validate and process one raw point.
    pub fn process(&mut self, raw: RawPoint, now: DateTime<Utc>) -> Result<DetectionOutcome> {
        let point = validate(raw, now, &self.config.ingestion)?;
        self.process_point(point)
    }

    /// Process a validated point. Baselines, history and training data are
    /// taken as of the point's own timestamp.
    pub fn process_point(&mut self, point: MetricPoint) -> Result<DetectionOutcome> {
        let series = point.series();
        let as_of = point.timestamp;

        let mut baseline = self.baselines.primary_baseline(&self.store, &series)?;
        if baseline.is_none() || self.baselines.refresh_due(&self.store, &series, as_of)? {
            self.baselines.refresh(&self.store, &series, as_of)?;
            baseline = self.baselines.primary_baseline(&self.store, &series)?;
        }

        let Some(baseline) = baseline else {
            let longest = self
                .config
                .baseline
                .windows
                .iter()
                .map(|w| w.seconds())
                .max()
                .unwrap_or(0);
            let observations = self.store.count_points_in_range(
                &series,
                span::before(as_of, longest),
                as_of,
            )? + 1;
            self.store.insert_point(&point)?;
            tracing::debug!(
                target: event_names::DETECT_LEARNING,
                series = %series,
                observations,
                need = self.config.baseline.min_observations,
            );
            return Ok(DetectionOutcome::Learning {
                series,
                observations,
            });
        };

        let profile = self.seasonal_profile(&series)?;
        let recent: Vec<f64> = self
            .store
            .recent_points(&series, as_of, self.config.statistical.recent_sample_size)?
            .iter()
            .map(|p| p.value)
            .collect();

        let report = statistical::evaluate(
            point.value,
            as_of,
            &baseline,
            profile.as_ref(),
            &recent,
            &self.config.statistical,
        );

        let features = ml::extract(point.value, as_of, &recent, &baseline).to_vec();
        let ml_score = self.score_ml(point.kind, &features, as_of);

        let findings = heuristics::evaluate(
            &HeuristicInput {
                name: &point.name,
                kind: point.kind,
                value: point.value,
                timestamp: as_of,
                baseline: &baseline,
                seasonal: profile.as_ref(),
            },
            &self.config.heuristics,
        );
        for f in &findings {
            tracing::debug!(
                target: event_names::DETECT_FINDING,
                series = %series,
                rule = f.rule.as_str(),
                boost = f.boost,
                critical = f.critical,
            );
        }

        let verdict = combine(&report, ml_score.as_ref(), &findings, &self.config.scoring);
        self.store.insert_point(&point)?;

        if !verdict.is_anomaly {
            tracing::trace!(
                target: event_names::DETECT_NORMAL,
                series = %series,
                score = verdict.score,
            );
            return Ok(DetectionOutcome::Normal {
                series,
                score: verdict.score,
                statistical_score: report.score,
                ml_score: ml_score.as_ref().map(|m| m.score),
                votes: report.votes,
            });
        }

        let mut methods: Vec<String> = report.flagged().map(|t| t.as_str().to_string()).collect();
        if let Some(m) = &ml_score {
            if m.isolation_flagged() {
                methods.push(ml::ISOLATION_FOREST.to_string());
            }
            if m.supervised_flagged() {
                methods.push(ml::RANDOM_FOREST.to_string());
            }
        }
        methods.extend(findings.iter().map(|f| f.rule.as_str().to_string()));

        let record = AnomalyRecord {
            id: AnomalyId::new(),
            series: series.clone(),
            kind: point.kind,
            value: point.value,
            expected: baseline.median,
            timestamp: as_of,
            detected_at: Utc::now(),
            score: verdict.score,
            severity: verdict.severity,
            methods,
            baseline_window: baseline.window,
            statistical: report,
            ml: ml_score,
            findings,
            features: Some(features),
            label: None,
        };
        self.store.insert_anomaly(&record)?;
        tracing::info!(
            target: event_names::DETECT_ANOMALY,
            series = %series,
            anomaly_id = %record.id,
            value = record.value,
            expected = record.expected,
            score = record.score,
            severity = record.severity.as_str(),
            methods = %record.methods.join(","),
        );
        Ok(DetectionOutcome::Anomalous(Box::new(record)))
    }

    /// Longest-window seasonal profile, preferring one with a detected
    /// pattern.
    fn seasonal_profile(&mut self, series: &SeriesKey) -> Result<Option<SeasonalProfile>> {
        Ok(self
            .baselines
            .baselines(&self.store, series)?
            .into_iter()
            .filter(|b| b.seasonal.is_some())
            .max_by_key(|b| (b.has_seasonality(), b.window.seconds()))
            .and_then(|b| b.seasonal))
    }

    /// Train opportunistically, then score. Training failures never fail
    /// the point.
    fn score_ml(&mut self, kind: MetricKind, features: &[f64], as_of: DateTime<Utc>) -> Option<MlScore> {
        if !self.ml.enabled() {
            return None;
        }
        if self.ml.training_due(kind, as_of) {
            if let Err(e) = self.ml.maybe_train(kind, &self.store, &mut self.baselines, as_of) {
                tracing::warn!(target: event_names::MODEL_ERROR, kind = %kind, error = %e);
            }
        }
        self.ml.score(kind, features)
    }

    /// Validate and process a batch; invalid points are reported, not fatal.
    pub fn process_batch(
        &mut self,
        points: impl IntoIterator<Item = RawPoint>,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let ingested = ingest_batch(points, now, &self.config.ingestion);
        let mut report = BatchReport {
            rejected: ingested.rejected,
            ..BatchReport::default()
        };
        for point in ingested.accepted {
            report.processed += 1;
            match self.process_point(point)? {
                DetectionOutcome::Learning { .. } => report.learning += 1,
                DetectionOutcome::Normal { .. } => report.normal += 1,
                DetectionOutcome::Anomalous(record) => report.anomalies.push(*record),
            }
        }
        tracing::info!(
            target: event_names::INGEST_BATCH,
            processed = report.processed,
            rejected = report.rejected.len(),
            anomalies = report.anomalies.len(),
        );
        Ok(report)
    }

    /// Validate and store points without scoring them.
    pub fn store_batch(
        &mut self,
        points: impl IntoIterator<Item = RawPoint>,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let ingested = ingest_batch(points, now, &self.config.ingestion);
        let stored = self.store.insert_points(&ingested.accepted)?;
        tracing::info!(
            target: event_names::INGEST_ACCEPTED,
            stored,
            rejected = ingested.rejected.len(),
        );
        Ok(BatchReport {
            processed: stored,
            rejected: ingested.rejected,
            ..BatchReport::default()
        })
    }

    /// Prune old points, refresh due baselines, retrain due models.
    pub fn maintenance(&mut self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let cutoff = span::before(now, self.config.storage.retention_secs);
        let points_pruned = self.store.prune_points_before(cutoff)?;
        if points_pruned > 0 {
            tracing::info!(target: event_names::STORE_PRUNED, points_pruned, cutoff = %cutoff);
        }

        let baselines_refreshed = self.baselines.refresh_all_due(&self.store, now)?;

        let mut models = Vec::new();
        for kind in MetricKind::ALL {
            if !self.ml.training_due(kind, now) {
                continue;
            }
            match self.ml.maybe_train(kind, &self.store, &mut self.baselines, now) {
                Ok(outcome) => models.push(outcome),
                Err(e) => {
                    tracing::warn!(target: event_names::MODEL_ERROR, kind = %kind, error = %e);
                    models.push(TrainOutcome::Skipped {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(MaintenanceReport {
            points_pruned,
            baselines_refreshed,
            models,
        })
    }

    /// Train now regardless of schedule, for one kind or all.
    pub fn train(&mut self, kind: Option<MetricKind>, now: DateTime<Utc>) -> Result<Vec<TrainOutcome>> {
        let kinds: Vec<MetricKind> = match kind {
            Some(k) => vec![k],
            None => MetricKind::ALL.to_vec(),
        };
        kinds
            .into_iter()
            .map(|k| self.ml.train(k, &self.store, &mut self.baselines, now))
            .collect()
    }

    /// Refresh one series, or every stored series. Returns windows fitted
    /// (one series) or series refreshed (all).
    pub fn refresh_baselines(&mut self, series: Option<&SeriesKey>, now: DateTime<Utc>) -> Result<usize> {
        match series {
            Some(s) => self.baselines.refresh(&self.store, s, now),
            None => {
                let all = self.store.series_list()?;
                for info in &all {
                    self.baselines.refresh(&self.store, &info.series, now)?;
                }
                Ok(all.len())
            }
        }
    }

    /// Stored baselines of one series, or of every series.
    pub fn baselines(&mut self, series: Option<&SeriesKey>) -> Result<Vec<(SeriesKey, BaselineSummary)>> {
        match series {
            Some(s) => Ok(self
                .baselines
                .baselines(&self.store, s)?
                .into_iter()
                .map(|b| (s.clone(), b))
                .collect()),
            None => Ok(self.store.all_baselines()?),
        }
    }

    pub fn reset_baselines(&mut self, series: Option<&SeriesKey>, now: DateTime<Utc>) -> Result<usize> {
        self.baselines.reset(&self.store, series, now)
    }

    pub fn export_baselines(&self, origin: &str, now: DateTime<Utc>) -> Result<String> {
        self.baselines.export_json(&self.store, origin, now)
    }

    pub fn import_baselines(&mut self, json: &str, now: DateTime<Utc>) -> Result<usize> {
        self.baselines.import_json(&self.store, json, now)
    }

    pub fn list_anomalies(&self, filter: &AnomalyFilter) -> Result<Vec<AnomalyRecord>> {
        Ok(self.store.list_anomalies(filter)?)
    }

    pub fn get_anomaly(&self, id: &AnomalyId) -> Result<AnomalyRecord> {
        self.store
            .get_anomaly(id)?
            .ok_or_else(|| Error::AnomalyNotFound { id: id.to_string() })
    }

    /// Record analyst feedback and return the updated record.
    pub fn label_anomaly(&self, id: &AnomalyId, label: bool) -> Result<AnomalyRecord> {
        if !self.store.label_anomaly(id, label)? {
            return Err(Error::AnomalyNotFound { id: id.to_string() });
        }
        self.get_anomaly(id)
    }

    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            store: self.store.stats()?,
            models: self.store.list_models()?,
            baseline_metadata: self.baselines.metadata(&self.store)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::statistical::{aggregate, TestKind, TestOutcome};
    use crate::detect::HeuristicRule;

    fn report(votes: usize, conclusive: usize, score_each: f64) -> StatisticalReport {
        let kinds = [TestKind::ZScore, TestKind::ModifiedZScore, TestKind::Iqr, TestKind::Grubbs];
        let tests = kinds
            .iter()
            .take(conclusive)
            .enumerate()
            .map(|(i, &k)| TestOutcome {
                test: k,
                statistic: 1.0,
                threshold: 1.0,
                score: score_each,
                is_outlier: i < votes,
                conclusive: true,
                p_value: None,
                note: None,
            })
            .collect();
        aggregate(tests, 2)
    }

    fn finding(boost: f64, critical: bool) -> Finding {
        Finding {
            rule: HeuristicRule::Saturation,
            message: String::new(),
            boost,
            critical,
        }
    }

    fn ml(score: f64) -> MlScore {
        MlScore {
            isolation_score: 0.5,
            isolation_threshold: 0.5,
            supervised_probability: None,
            score,
            is_anomaly: score >= 0.5,
        }
    }

    #[test]
    fn statistical_only_uses_full_weight() {
        let v = combine(&report(1, 4, 0.65), None, &[], &ScoringSettings::default());
        assert!((v.score - 0.65).abs() < 1e-12);
        assert!(v.is_anomaly);
        assert_eq!(v.severity, Severity::Low);
    }

    #[test]
    fn ml_blends_with_weights() {
        let v = combine(&report(0, 4, 0.6), Some(&ml(0.9)), &[], &ScoringSettings::default());
        assert!((v.score - 0.72).abs() < 1e-9);
        assert_eq!(v.severity, Severity::Medium);
    }

    #[test]
    fn boosts_add_and_clamp() {
        let v = combine(
            &report(0, 4, 0.5),
            None,
            &[finding(0.3, false), finding(0.4, false)],
            &ScoringSettings::default(),
        );
        assert_eq!(v.score, 1.0);
        assert_eq!(v.severity, Severity::Critical);
    }

    #[test]
    fn critical_finding_forces_high() {
        let v = combine(&report(0, 4, 0.1), None, &[finding(0.0, true)], &ScoringSettings::default());
        assert!(v.is_anomaly);
        assert!(v.critical);
        assert_eq!(v.severity, Severity::High);
    }

    #[test]
    fn unanimous_votes_flag_below_threshold() {
        let v = combine(&report(3, 3, 0.55), None, &[], &ScoringSettings::default());
        assert!(v.score < 0.6);
        assert!(v.is_anomaly);
        // Two unanimous votes are not enough.
        let v = combine(&report(2, 2, 0.55), None, &[], &ScoringSettings::default());
        assert!(!v.is_anomaly);
    }
}
