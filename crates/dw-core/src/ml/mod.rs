//! Per-kind ML models: an isolation forest over recent history and, once
//! analysts have labeled enough anomalies, a random forest over the
//! labeled records.
//!
//! Models are trained opportunistically, persisted to the store as JSON,
//! and reloaded when the engine starts.

pub mod features;
pub mod isolation_forest;
pub mod random_forest;

pub use features::{extract, extract_history, FEATURE_NAMES, N_FEATURES};
pub use isolation_forest::IsolationForest;
pub use random_forest::RandomForest;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dw_common::{MetricKind, Result, TimeWindow};
use dw_config::MlSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::baseline::{fit_baseline, BaselineManager};
use crate::logging::event_names;
use crate::span;
use crate::store::Store;

pub const ISOLATION_FOREST: &str = "isolation_forest";
pub const RANDOM_FOREST: &str = "random_forest";

/// Wait this long before retrying a training run that found too little
/// usable data.
const RETRY_AFTER_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("need {need} training samples, have {have}")]
    InsufficientSamples { have: usize, need: usize },

    #[error("feature dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("labels contain a single class")]
    SingleClass,
}

impl From<ModelError> for dw_common::Error {
    fn from(err: ModelError) -> Self {
        dw_common::Error::Training(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlScore {
    pub isolation_score: f64,
    pub isolation_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervised_probability: Option<f64>,
    /// Blend in [0, 1]; 0.5 sits at the isolation threshold.
    pub score: f64,
    pub is_anomaly: bool,
}

impl MlScore {
    pub fn isolation_flagged(&self) -> bool {
        self.isolation_score >= self.isolation_threshold
    }

    pub fn supervised_flagged(&self) -> bool {
        self.supervised_probability.is_some_and(|p| p >= 0.5)
    }
}

/// Map an isolation score onto [0, 1] so the threshold lands on 0.5.
pub fn normalize_isolation(score: f64, threshold: f64) -> f64 {
    let t = threshold.clamp(1e-6, 1.0 - 1e-6);
    let s = score.clamp(0.0, 1.0);
    if s >= t {
        0.5 + 0.5 * (s - t) / (1.0 - t)
    } else {
        0.5 * s / t
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainOutcome {
    Trained {
        kind: MetricKind,
        n_samples: usize,
        supervised: bool,
        n_labeled: usize,
    },
    Skipped {
        kind: MetricKind,
        reason: String,
    },
}

#[derive(Debug, Clone, Default)]
struct KindModels {
    isolation: Option<IsolationForest>,
    forest: Option<RandomForest>,
    trained_at: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MlDetector {
    cfg: MlSettings,
    models: HashMap<MetricKind, KindModels>,
}

impl MlDetector {
    pub fn new(cfg: MlSettings) -> Self {
        Self {
            cfg,
            models: HashMap::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Load persisted models. Unreadable models are logged and dropped so
    /// they get retrained.
    pub fn load(&mut self, store: &Store) -> Result<usize> {
        let mut loaded = 0;
        for kind in MetricKind::ALL {
            let entry = self.models.entry(kind).or_default();
            if let Some(stored) = store.load_model(kind, ISOLATION_FOREST)? {
                match serde_json::from_str::<IsolationForest>(&stored.json) {
                    Ok(model) => {
                        entry.isolation = Some(model);
                        entry.trained_at = Some(stored.trained_at);
                        loaded += 1;
                    }
                    Err(e) => tracing::warn!(
                        target: event_names::MODEL_ERROR,
                        kind = %kind,
                        model = ISOLATION_FOREST,
                        error = %e,
                    ),
                }
            }
            if let Some(stored) = store.load_model(kind, RANDOM_FOREST)? {
                match serde_json::from_str::<RandomForest>(&stored.json) {
                    Ok(model) => {
                        entry.forest = Some(model);
                        loaded += 1;
                    }
                    Err(e) => tracing::warn!(
                        target: event_names::MODEL_ERROR,
                        kind = %kind,
                        model = RANDOM_FOREST,
                        error = %e,
                    ),
                }
            }
        }
        if loaded > 0 {
            tracing::debug!(target: event_names::MODEL_LOADED, models = loaded);
        }
        Ok(loaded)
    }

    pub fn has_model(&self, kind: MetricKind) -> bool {
        self.models.get(&kind).is_some_and(|m| m.isolation.is_some())
    }

    pub fn trained_at(&self, kind: MetricKind) -> Option<DateTime<Utc>> {
        self.models.get(&kind).and_then(|m| m.trained_at)
    }

    /// A model is due when it is missing or older than the retrain
    /// interval, and no failed attempt happened in the last minute.
    pub fn training_due(&self, kind: MetricKind, now: DateTime<Utc>) -> bool {
        if !self.cfg.enabled {
            return false;
        }
        let Some(entry) = self.models.get(&kind) else {
            return true;
        };
        if let Some(attempt) = entry.last_attempt {
            if !span::elapsed(attempt, now, RETRY_AFTER_SECS) && now >= attempt {
                return false;
            }
        }
        match entry.trained_at {
            None => true,
            Some(at) => span::elapsed(at, now, self.cfg.retrain_interval_secs),
        }
    }

    /// Train when due; see [`MlDetector::train`].
    pub fn maybe_train(
        &mut self,
        kind: MetricKind,
        store: &Store,
        baselines: &mut BaselineManager,
        now: DateTime<Utc>,
    ) -> Result<TrainOutcome> {
        if !self.training_due(kind, now) {
            return Ok(TrainOutcome::Skipped {
                kind,
                reason: "not due".to_string(),
            });
        }
        self.train(kind, store, baselines, now)
    }

    fn skip(&mut self, kind: MetricKind, now: DateTime<Utc>, reason: String) -> TrainOutcome {
        self.models.entry(kind).or_default().last_attempt = Some(now);
        tracing::debug!(target: event_names::MODEL_SKIPPED, kind = %kind, reason = %reason);
        TrainOutcome::Skipped { kind, reason }
    }

    /// Train the models of `kind` from the last `training_lookback_secs`
    /// of history and the labeled anomaly records.
    pub fn train(
        &mut self,
        kind: MetricKind,
        store: &Store,
        baselines: &mut BaselineManager,
        now: DateTime<Utc>,
    ) -> Result<TrainOutcome> {
        if !self.cfg.enabled {
            return Ok(TrainOutcome::Skipped {
                kind,
                reason: "ml disabled".to_string(),
            });
        }
        let since = span::before(now, self.cfg.training_lookback_secs);
        let available = store.count_points_by_kind_since(kind, since)?;
        if available < self.cfg.min_training_samples {
            // Cheap check; no retry backoff.
            return Ok(TrainOutcome::Skipped {
                kind,
                reason: format!(
                    "{} points in lookback, need {}",
                    available, self.cfg.min_training_samples
                ),
            });
        }

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for history in store.points_by_kind_since(kind, since, self.cfg.max_training_samples)? {
            let baseline = match baselines.primary_baseline(store, &history.series)? {
                Some(b) => b,
                None => {
                    let values: Vec<f64> = history.points.iter().map(|(_, v)| *v).collect();
                    match fit_baseline(&values, TimeWindow::Week, now, baselines.settings()) {
                        Some(b) => b,
                        None => continue,
                    }
                }
            };
            rows.extend(extract_history(&history.points, &baseline));
        }
        if rows.len() < self.cfg.min_training_samples {
            let reason = format!(
                "{} usable feature rows, need {}",
                rows.len(),
                self.cfg.min_training_samples
            );
            return Ok(self.skip(kind, now, reason));
        }

        let isolation = IsolationForest::fit(&rows, &self.cfg.isolation, self.cfg.seed)?;
        store.save_model(
            kind,
            ISOLATION_FOREST,
            now,
            rows.len(),
            &serde_json::to_string(&isolation)?,
        )?;

        let (forest, n_labeled) = self.train_supervised(kind, store, now)?;

        let n_samples = rows.len();
        let entry = self.models.entry(kind).or_default();
        entry.isolation = Some(isolation);
        if forest.is_some() {
            entry.forest = forest;
        }
        entry.trained_at = Some(now);
        entry.last_attempt = None;
        let supervised = entry.forest.is_some();

        tracing::info!(
            target: event_names::MODEL_TRAINED,
            kind = %kind,
            n_samples,
            supervised,
            n_labeled,
        );
        Ok(TrainOutcome::Trained {
            kind,
            n_samples,
            supervised,
            n_labeled,
        })
    }

    fn train_supervised(
        &self,
        kind: MetricKind,
        store: &Store,
        now: DateTime<Utc>,
    ) -> Result<(Option<RandomForest>, usize)> {
        let (x, y): (Vec<Vec<f64>>, Vec<bool>) = store
            .labeled_anomalies(kind)?
            .into_iter()
            .filter_map(|r| match (r.features, r.label) {
                (Some(f), Some(label)) if f.len() == N_FEATURES => Some((f, label)),
                _ => None,
            })
            .unzip();
        let n_labeled = x.len();
        let positives = y.iter().filter(|&&l| l).count();
        if n_labeled < self.cfg.min_labeled_samples || positives == 0 || positives == n_labeled {
            return Ok((None, n_labeled));
        }
        let forest = RandomForest::fit(&x, &y, &self.cfg.forest, self.cfg.seed)?;
        store.save_model(
            kind,
            RANDOM_FOREST,
            now,
            n_labeled,
            &serde_json::to_string(&forest)?,
        )?;
        Ok((Some(forest), n_labeled))
    }

    /// Score a feature vector. `None` when ML is disabled or no model of
    /// this kind exists.
    pub fn score(&self, kind: MetricKind, features: &[f64]) -> Option<MlScore> {
        if !self.cfg.enabled {
            return None;
        }
        let entry = self.models.get(&kind)?;
        let isolation = entry.isolation.as_ref()?;
        let isolation_score = isolation.score(features);
        let isolation_threshold = isolation.threshold();
        let normalized = normalize_isolation(isolation_score, isolation_threshold);
        let supervised_probability = entry.forest.as_ref().map(|f| f.predict_proba(features));
        let score = match supervised_probability {
            Some(p) => 0.5 * (normalized + p),
            None => normalized,
        };
        Some(MlScore {
            isolation_score,
            isolation_threshold,
            supervised_probability,
            score,
            is_anomaly: score >= 0.5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_pins_threshold_to_half() {
        assert!((normalize_isolation(0.6, 0.6) - 0.5).abs() < 1e-12);
        assert_eq!(normalize_isolation(1.0, 0.6), 1.0);
        assert_eq!(normalize_isolation(0.0, 0.6), 0.0);
        assert!(normalize_isolation(0.3, 0.6) < 0.5);
        assert!(normalize_isolation(0.8, 0.6) > 0.5);
    }

    #[test]
    fn no_model_no_score() {
        let ml = MlDetector::new(MlSettings::default());
        assert!(ml.score(MetricKind::Network, &[0.0; N_FEATURES]).is_none());
        assert!(ml.training_due(MetricKind::Network, Utc::now()));
    }

    #[test]
    fn disabled_never_trains() {
        let ml = MlDetector::new(MlSettings {
            enabled: false,
            ..MlSettings::default()
        });
        assert!(!ml.training_due(MetricKind::Generic, Utc::now()));
    }
}
