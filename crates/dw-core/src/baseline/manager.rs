//! Baseline lifecycle: refresh, lookup, reset, export and import.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use dw_common::{Error, Result, SeriesKey, TimeWindow, SCHEMA_VERSION};
use dw_config::BaselineSettings;
use serde::{Deserialize, Serialize};

use super::{fit_with_seasonality, BaselineSummary, SeasonalPattern};
use crate::logging::event_names;
use crate::span;
use crate::store::Store;

const METADATA_KEY: &str = "baseline_metadata";

/// Provenance of the stored baselines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetadata {
    pub reset_count: u32,
    pub last_reset_at: Option<DateTime<Utc>>,
    /// Host the last import came from.
    pub imported_from: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
    /// Observations across all stored baselines at the last export/import.
    pub total_observations: usize,
}

/// Baselines of one series in an export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesBaselines {
    pub series: SeriesKey,
    pub summaries: Vec<BaselineSummary>,
}

/// Portable baseline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineExport {
    pub schema_version: u32,
    /// Host id of the exporting engine.
    pub origin: String,
    pub exported_at: DateTime<Utc>,
    pub baselines: Vec<SeriesBaselines>,
    pub metadata: BaselineMetadata,
}

#[derive(Debug, Clone, Default)]
struct CachedSeries {
    windows: BTreeMap<TimeWindow, BaselineSummary>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Keeps per-series, per-window baselines fitted from the store and
/// caches them in memory.
#[derive(Debug)]
pub struct BaselineManager {
    cfg: BaselineSettings,
    cache: HashMap<SeriesKey, CachedSeries>,
}

impl BaselineManager {
    pub fn new(cfg: BaselineSettings) -> Self {
        Self {
            cfg,
            cache: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &BaselineSettings {
        &self.cfg
    }

    fn cached(&mut self, store: &Store, series: &SeriesKey) -> Result<&mut CachedSeries> {
        if !self.cache.contains_key(series) {
            let mut entry = CachedSeries::default();
            for summary in store.load_baselines(series)? {
                entry.refreshed_at = entry.refreshed_at.max(Some(summary.computed_at));
                entry.windows.insert(summary.window, summary);
            }
            self.cache.insert(series.clone(), entry);
        }
        self.cache
            .get_mut(series)
            .ok_or_else(|| Error::Storage(format!("baseline cache miss for {}", series)))
    }

    /// Refit every configured window of `series` from points in
    /// `[now - window, now)`. Windows without enough points lose their
    /// baseline. Returns the number of windows fitted.
    pub fn refresh(&mut self, store: &Store, series: &SeriesKey, now: DateTime<Utc>) -> Result<usize> {
        let mut fitted = BTreeMap::new();
        for &window in &self.cfg.windows {
            let from = span::before(now, window.seconds());
            let points = store.points_in_range(
                series,
                from,
                now,
                Some(self.cfg.max_points_per_window),
            )?;
            let samples: Vec<(DateTime<Utc>, f64)> =
                points.iter().map(|p| (p.timestamp, p.value)).collect();

            match fit_with_seasonality(&samples, window, now, &self.cfg) {
                Some(summary) => {
                    store.save_baseline(series, &summary)?;
                    tracing::debug!(
                        target: event_names::BASELINE_REFRESHED,
                        series = %series,
                        window = %window,
                        n = summary.n,
                        mean = summary.mean,
                        std_dev = summary.std_dev,
                        cold_start = summary.cold_start,
                    );
                    if let Some(profile) = summary
                        .seasonal
                        .as_ref()
                        .filter(|p| p.pattern != SeasonalPattern::None)
                    {
                        tracing::debug!(
                            target: event_names::BASELINE_SEASONAL,
                            series = %series,
                            window = %window,
                            pattern = ?profile.pattern,
                            hourly_strength = profile.hourly_strength,
                            daily_strength = profile.daily_strength,
                        );
                    }
                    fitted.insert(window, summary);
                }
                None => {
                    store.delete_baseline(series, window)?;
                    tracing::trace!(
                        target: event_names::BASELINE_INSUFFICIENT,
                        series = %series,
                        window = %window,
                        have = samples.len(),
                        need = self.cfg.min_observations,
                    );
                }
            }
        }

        let count = fitted.len();
        self.cache.insert(
            series.clone(),
            CachedSeries {
                windows: fitted,
                refreshed_at: Some(now),
            },
        );
        Ok(count)
    }

    /// True when the series has never been refreshed or the last refresh
    /// is older than the refresh interval.
    pub fn refresh_due(&mut self, store: &Store, series: &SeriesKey, now: DateTime<Utc>) -> Result<bool> {
        let interval = self.cfg.refresh_interval_secs;
        Ok(match self.cached(store, series)?.refreshed_at {
            None => true,
            Some(at) => span::elapsed(at, now, interval) || at > now,
        })
    }

    /// Refresh every stored series that is due. Returns how many were.
    pub fn refresh_all_due(&mut self, store: &Store, now: DateTime<Utc>) -> Result<usize> {
        let mut refreshed = 0;
        for info in store.series_list()? {
            if self.refresh_due(store, &info.series, now)? {
                self.refresh(store, &info.series, now)?;
                refreshed += 1;
            }
        }
        Ok(refreshed)
    }

    pub fn baseline(
        &mut self,
        store: &Store,
        series: &SeriesKey,
        window: TimeWindow,
    ) -> Result<Option<BaselineSummary>> {
        Ok(self.cached(store, series)?.windows.get(&window).cloned())
    }

    /// Every fitted window of a series, in configured order.
    pub fn baselines(&mut self, store: &Store, series: &SeriesKey) -> Result<Vec<BaselineSummary>> {
        let windows = self.cfg.windows.clone();
        let entry = self.cached(store, series)?;
        Ok(windows
            .iter()
            .filter_map(|w| entry.windows.get(w).cloned())
            .collect())
    }

    /// First configured window whose baseline is warm.
    pub fn primary_baseline(&mut self, store: &Store, series: &SeriesKey) -> Result<Option<BaselineSummary>> {
        let min = self.cfg.min_observations;
        Ok(self
            .baselines(store, series)?
            .into_iter()
            .find(|b| b.is_warm(min)))
    }

    pub fn metadata(&self, store: &Store) -> Result<BaselineMetadata> {
        match store.get_meta(METADATA_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(BaselineMetadata::default()),
        }
    }

    fn save_metadata(&self, store: &Store, meta: &BaselineMetadata) -> Result<()> {
        store.set_meta(METADATA_KEY, &serde_json::to_string(meta)?)?;
        Ok(())
    }

    /// Drop baselines of one series, or of every series. Returns rows removed.
    pub fn reset(&mut self, store: &Store, series: Option<&SeriesKey>, now: DateTime<Utc>) -> Result<usize> {
        let removed = store.delete_baselines(series)?;
        match series {
            Some(s) => {
                self.cache.remove(s);
            }
            None => self.cache.clear(),
        }

        let mut meta = self.metadata(store)?;
        meta.reset_count += 1;
        meta.last_reset_at = Some(now);
        meta.total_observations = store.all_baselines()?.iter().map(|(_, b)| b.n).sum();
        self.save_metadata(store, &meta)?;

        tracing::info!(
            target: event_names::BASELINE_RESET,
            scope = %series.map(|s| s.to_string()).unwrap_or_else(|| "all".to_string()),
            removed,
            reset_count = meta.reset_count,
        );
        Ok(removed)
    }

    /// Serialize every stored baseline for transfer to another engine.
    pub fn export_json(&self, store: &Store, origin: &str, now: DateTime<Utc>) -> Result<String> {
        let all = store.all_baselines()?;
        if all.is_empty() {
            return Err(Error::Storage("no baselines to export".to_string()));
        }
        let mut grouped: BTreeMap<SeriesKey, Vec<BaselineSummary>> = BTreeMap::new();
        for (series, summary) in all {
            grouped.entry(series).or_default().push(summary);
        }
        let mut metadata = self.metadata(store)?;
        metadata.total_observations = grouped.values().flatten().map(|b| b.n).sum();

        let export = BaselineExport {
            schema_version: SCHEMA_VERSION,
            origin: origin.to_string(),
            exported_at: now,
            baselines: grouped
                .into_iter()
                .map(|(series, summaries)| SeriesBaselines { series, summaries })
                .collect(),
            metadata,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Load an export document into the store, replacing baselines of the
    /// same series and window. Documents from a newer schema are refused.
    pub fn import_json(&mut self, store: &Store, json: &str, now: DateTime<Utc>) -> Result<usize> {
        let export: BaselineExport = serde_json::from_str(json)?;
        let newest = export
            .baselines
            .iter()
            .flat_map(|s| s.summaries.iter().map(|b| b.schema_version))
            .chain(std::iter::once(export.schema_version))
            .max()
            .unwrap_or(export.schema_version);
        if newest > SCHEMA_VERSION {
            return Err(Error::BaselineSchema {
                supported: SCHEMA_VERSION,
                found: newest,
            });
        }

        let mut imported = 0;
        for entry in &export.baselines {
            for summary in &entry.summaries {
                store.save_baseline(&entry.series, summary)?;
                imported += 1;
            }
            self.cache.remove(&entry.series);
        }

        let mut meta = self.metadata(store)?;
        meta.imported_from = Some(export.origin.clone());
        meta.imported_at = Some(now);
        meta.total_observations = store.all_baselines()?.iter().map(|(_, b)| b.n).sum();
        self.save_metadata(store, &meta)?;

        tracing::info!(
            target: event_names::BASELINE_IMPORTED,
            origin = %export.origin,
            imported,
        );
        Ok(imported)
    }
}
