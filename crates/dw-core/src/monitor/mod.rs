//! Long-running monitor loop.
//!
//! The loop itself lives in the CLI (`watch`); this module holds the
//! testable pieces: the running state with its bounded event ring and tick
//! schedule, and a synchronous `process_tick` that runs engine maintenance.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dw_config::MonitorSettings;
use serde::{Deserialize, Serialize};

use crate::detect::DetectionOutcome;
use crate::engine::{AnomalyEngine, MaintenanceReport};
use crate::logging::event_names;
use crate::ml::TrainOutcome;
use crate::span;

/// A monitor event for audit output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: MonitorEventType,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventType {
    Started,
    Stopped,
    TickCompleted,
    AnomalyDetected,
    PointRejected,
    PointsPruned,
    BaselinesRefreshed,
    ModelTrained,
    MaintenanceFailed,
}

/// Running state of the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorState {
    pub started_at: DateTime<Utc>,
    pub tick_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub points_processed: u64,
    pub points_rejected: u64,
    pub anomalies: u64,
    /// Recent events, oldest first.
    pub recent_events: VecDeque<MonitorEvent>,
    capacity: usize,
}

impl MonitorState {
    pub fn new(settings: &MonitorSettings, now: DateTime<Utc>) -> Self {
        let capacity = settings.event_ring_capacity.max(1);
        let mut state = Self {
            started_at: now,
            tick_count: 0,
            last_tick_at: None,
            points_processed: 0,
            points_rejected: 0,
            anomalies: 0,
            recent_events: VecDeque::with_capacity(capacity),
            capacity,
        };
        state.record_event(now, MonitorEventType::Started, "monitor started");
        state
    }

    pub fn record_event(&mut self, timestamp: DateTime<Utc>, event_type: MonitorEventType, detail: &str) {
        if self.recent_events.len() >= self.capacity {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(MonitorEvent {
            timestamp,
            event_type,
            detail: detail.to_string(),
        });
    }

    /// Due on the first call and then every `tick_interval_secs`. A clock
    /// that went backwards also counts as due.
    pub fn tick_due(&self, settings: &MonitorSettings, now: DateTime<Utc>) -> bool {
        match self.last_tick_at {
            None => true,
            Some(last) => {
                let interval = i64::try_from(settings.tick_interval_secs).unwrap_or(i64::MAX);
                now < last || span::elapsed(last, now, interval)
            }
        }
    }

    /// How long an idle loop may wait before the next tick is due.
    pub fn time_until_tick(&self, settings: &MonitorSettings, now: DateTime<Utc>) -> std::time::Duration {
        let Some(last) = self.last_tick_at else {
            return std::time::Duration::ZERO;
        };
        if now < last {
            return std::time::Duration::ZERO;
        }
        let interval = i64::try_from(settings.tick_interval_secs).unwrap_or(i64::MAX);
        span::after(last, interval)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    /// Account for one processed point.
    pub fn record_outcome(&mut self, outcome: &DetectionOutcome, now: DateTime<Utc>) {
        self.points_processed += 1;
        if let Some(record) = outcome.anomaly() {
            self.anomalies += 1;
            self.record_event(
                now,
                MonitorEventType::AnomalyDetected,
                &format!(
                    "{} value {} score {:.3} ({})",
                    record.series, record.value, record.score, record.severity
                ),
            );
        }
    }

    pub fn record_rejection(&mut self, reason: &str, now: DateTime<Utc>) {
        self.points_rejected += 1;
        self.record_event(now, MonitorEventType::PointRejected, reason);
    }

    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.record_event(
            now,
            MonitorEventType::Stopped,
            &format!(
                "{} points, {} anomalies, {} ticks",
                self.points_processed, self.anomalies, self.tick_count
            ),
        );
        tracing::info!(
            target: event_names::MONITOR_STOPPED,
            points = self.points_processed,
            rejected = self.points_rejected,
            anomalies = self.anomalies,
            ticks = self.tick_count,
        );
    }
}

/// Outcome of a single monitor tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<MaintenanceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<MonitorEvent>,
}

/// Run one tick: engine maintenance plus bookkeeping. A maintenance
/// failure is recorded on the outcome and does not stop the monitor.
pub fn process_tick(
    state: &mut MonitorState,
    engine: &mut AnomalyEngine,
    now: DateTime<Utc>,
) -> TickOutcome {
    state.tick_count += 1;
    let tick_number = state.tick_count;
    state.last_tick_at = Some(now);

    let mut events = Vec::new();
    let mut push = |state: &mut MonitorState, event_type: MonitorEventType, detail: String| {
        state.record_event(now, event_type, &detail);
        events.push(MonitorEvent {
            timestamp: now,
            event_type,
            detail,
        });
    };

    let (maintenance, error) = match engine.maintenance(now) {
        Ok(report) => {
            if report.points_pruned > 0 {
                push(
                    state,
                    MonitorEventType::PointsPruned,
                    format!("{} points pruned", report.points_pruned),
                );
            }
            if report.baselines_refreshed > 0 {
                push(
                    state,
                    MonitorEventType::BaselinesRefreshed,
                    format!("{} series refreshed", report.baselines_refreshed),
                );
            }
            for model in &report.models {
                if let TrainOutcome::Trained { kind, n_samples, .. } = model {
                    push(
                        state,
                        MonitorEventType::ModelTrained,
                        format!("{} models trained on {} samples", kind, n_samples),
                    );
                }
            }
            (Some(report), None)
        }
        Err(e) => {
            push(state, MonitorEventType::MaintenanceFailed, e.to_string());
            (None, Some(e.to_string()))
        }
    };

    state.record_event(now, MonitorEventType::TickCompleted, &format!("tick {}", tick_number));
    tracing::debug!(
        target: event_names::MONITOR_TICK,
        tick = tick_number,
        events = events.len(),
        failed = error.is_some(),
    );

    TickOutcome {
        tick_number,
        maintenance,
        error,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RawPoint;
    use crate::store::Store;
    use chrono::{Duration, TimeZone};
    use dw_config::EngineConfig;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn engine() -> AnomalyEngine {
        let mut cfg = EngineConfig::default();
        cfg.ml.enabled = false;
        AnomalyEngine::new(cfg, Store::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn ring_is_bounded() {
        let settings = MonitorSettings {
            event_ring_capacity: 10,
            ..MonitorSettings::default()
        };
        let mut state = MonitorState::new(&settings, t0());
        for i in 0..25 {
            state.record_event(t0(), MonitorEventType::TickCompleted, &format!("tick {}", i));
        }
        assert_eq!(state.recent_events.len(), 10);
        assert_eq!(state.recent_events.back().unwrap().detail, "tick 24");
    }

    #[test]
    fn tick_due_follows_interval() {
        let settings = MonitorSettings::default();
        let mut state = MonitorState::new(&settings, t0());
        assert!(state.tick_due(&settings, t0()));
        state.last_tick_at = Some(t0());
        assert!(!state.tick_due(&settings, t0() + Duration::seconds(59)));
        assert!(state.tick_due(&settings, t0() + Duration::seconds(60)));
        assert!(state.tick_due(&settings, t0() - Duration::seconds(1)));
    }

    #[test]
    fn idle_wait_counts_down_to_next_tick() {
        let settings = MonitorSettings {
            tick_interval_secs: 60,
            ..MonitorSettings::default()
        };
        let mut state = MonitorState::new(&settings, t0());
        assert_eq!(state.time_until_tick(&settings, t0()), std::time::Duration::ZERO);

        state.last_tick_at = Some(t0());
        let secs = |d: std::time::Duration| d.as_secs();
        assert_eq!(secs(state.time_until_tick(&settings, t0())), 60);
        assert_eq!(secs(state.time_until_tick(&settings, t0() + Duration::seconds(45))), 15);
        assert_eq!(
            state.time_until_tick(&settings, t0() + Duration::seconds(90)),
            std::time::Duration::ZERO
        );
        assert_eq!(
            state.time_until_tick(&settings, t0() - Duration::seconds(5)),
            std::time::Duration::ZERO
        );

        let huge = MonitorSettings {
            tick_interval_secs: u64::MAX,
            ..MonitorSettings::default()
        };
        assert!(!state.tick_due(&huge, t0() + Duration::days(365)));
        assert!(state.time_until_tick(&huge, t0()) > std::time::Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn ticks_back_to_back_without_input() {
        let settings = MonitorSettings {
            tick_interval_secs: 1,
            ..MonitorSettings::default()
        };
        let mut engine = engine();
        let mut state = MonitorState::new(&settings, t0());
        let mut now = t0();
        for _ in 0..3 {
            now += Duration::seconds(state.time_until_tick(&settings, now).as_secs() as i64);
            assert!(state.tick_due(&settings, now));
            process_tick(&mut state, &mut engine, now);
        }
        assert_eq!(state.tick_count, 3);
        assert_eq!(state.last_tick_at, Some(t0() + Duration::seconds(2)));
    }

    #[test]
    fn tick_runs_maintenance() {
        let settings = MonitorSettings::default();
        let mut engine = engine();
        let mut state = MonitorState::new(&settings, t0());
        for i in 0..20 {
            let raw = RawPoint::new("queue.depth", 10.0 + (i % 3) as f64)
                .at(t0() - Duration::minutes(30) + Duration::seconds(i * 60));
            engine.process(raw, t0()).unwrap();
        }

        let outcome = process_tick(&mut state, &mut engine, t0());
        assert_eq!(outcome.tick_number, 1);
        assert!(outcome.error.is_none());
        assert!(outcome.maintenance.is_some());
        assert_eq!(state.tick_count, 1);
        assert_eq!(state.last_tick_at, Some(t0()));
        assert_eq!(
            state.recent_events.back().map(|e| e.event_type),
            Some(MonitorEventType::TickCompleted)
        );
    }

    #[test]
    fn anomalies_are_counted() {
        let settings = MonitorSettings::default();
        let mut state = MonitorState::new(&settings, t0());
        let outcome = DetectionOutcome::Learning {
            series: dw_common::SeriesKey::new("x", "default"),
            observations: 1,
        };
        state.record_outcome(&outcome, t0());
        state.record_rejection("bad name", t0());
        assert_eq!(state.points_processed, 1);
        assert_eq!(state.points_rejected, 1);
        assert_eq!(state.anomalies, 0);
        state.stop(t0());
        assert_eq!(
            state.recent_events.back().map(|e| e.event_type),
            Some(MonitorEventType::Stopped)
        );
    }
}
