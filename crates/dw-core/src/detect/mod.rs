//! Detection results and the types persisted for flagged points.

pub mod heuristics;
pub mod statistical;

pub use heuristics::{Finding, HeuristicInput, HeuristicRule};
pub use statistical::{StatisticalReport, TestKind, TestOutcome};

use chrono::{DateTime, Utc};
use dw_common::{AnomalyId, MetricKind, SeriesKey, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::ml::MlScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Band a combined score: below 0.7 Low, below 0.8 Medium, below 0.9
    /// High, otherwise Critical.
    pub fn from_score(score: f64) -> Self {
        if score < 0.7 {
            Severity::Low
        } else if score < 0.8 {
            Severity::Medium
        } else if score < 0.9 {
            Severity::High
        } else {
            Severity::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" | "med" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" | "crit" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Ordinal used for `>=` filtering in storage.
    pub fn rank(&self) -> i64 {
        *self as i64
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged point with everything that went into the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: AnomalyId,
    pub series: SeriesKey,
    pub kind: MetricKind,
    pub value: f64,
    /// Baseline median at detection time.
    pub expected: f64,
    pub timestamp: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub score: f64,
    pub severity: Severity,
    /// Detectors and rules that flagged the point.
    pub methods: Vec<String>,
    pub baseline_window: TimeWindow,
    pub statistical: StatisticalReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml: Option<MlScore>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Model feature vector, kept so labeled records can train the
    /// supervised model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f64>>,
    /// Analyst feedback: `true` confirmed, `false` false positive.
    #[serde(default)]
    pub label: Option<bool>,
}

/// Result of processing one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetectionOutcome {
    /// No warm baseline yet; the point was stored for learning.
    Learning {
        series: SeriesKey,
        observations: usize,
    },
    Normal {
        series: SeriesKey,
        score: f64,
        statistical_score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ml_score: Option<f64>,
        votes: usize,
    },
    Anomalous(Box<AnomalyRecord>),
}

impl DetectionOutcome {
    pub fn series(&self) -> &SeriesKey {
        match self {
            DetectionOutcome::Learning { series, .. } | DetectionOutcome::Normal { series, .. } => {
                series
            }
            DetectionOutcome::Anomalous(record) => &record.series,
        }
    }

    pub fn anomaly(&self) -> Option<&AnomalyRecord> {
        match self {
            DetectionOutcome::Anomalous(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        matches!(self, DetectionOutcome::Anomalous(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_score(0.6), Severity::Low);
        assert_eq!(Severity::from_score(0.7), Severity::Medium);
        assert_eq!(Severity::from_score(0.85), Severity::High);
        assert_eq!(Severity::from_score(0.9), Severity::Critical);
        assert_eq!(Severity::from_score(1.0), Severity::Critical);
    }

    #[test]
    fn severity_ordering_and_parse() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(Severity::High.max(Severity::Low), Severity::High);
        assert_eq!(Severity::parse("CRIT"), Some(Severity::Critical));
        assert_eq!(Severity::parse("urgent"), None);
        assert_eq!(Severity::Medium.rank(), 1);
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let o = DetectionOutcome::Learning {
            series: SeriesKey::new("x", "y"),
            observations: 3,
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["outcome"], "learning");
        assert_eq!(v["observations"], 3);
        assert!(!o.is_anomalous());
        assert_eq!(o.series().name, "x");
    }
}
