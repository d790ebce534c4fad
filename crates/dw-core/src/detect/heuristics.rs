//! Domain rules per metric kind.
//!
//! Rules look at the raw value against the baseline in ways the generic
//! tests do not: absolute saturation, traffic dropping to zero, bursts of
//! security events, activity in hours that are normally silent. Each
//! finding adds a boost to the combined score; critical findings flag the
//! point on their own.

use chrono::{DateTime, Timelike, Utc};
use dw_common::MetricKind;
use dw_config::HeuristicSettings;
use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineSummary, SeasonalProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicRule {
    TrafficSpike,
    TrafficDrop,
    Saturation,
    LatencyDegradation,
    BurstActivity,
    OffHoursActivity,
}

impl HeuristicRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicRule::TrafficSpike => "traffic_spike",
            HeuristicRule::TrafficDrop => "traffic_drop",
            HeuristicRule::Saturation => "saturation",
            HeuristicRule::LatencyDegradation => "latency_degradation",
            HeuristicRule::BurstActivity => "burst_activity",
            HeuristicRule::OffHoursActivity => "off_hours_activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: HeuristicRule,
    pub message: String,
    pub boost: f64,
    pub critical: bool,
}

const UTILIZATION_MARKERS: &[&str] = &["cpu", "mem", "disk", "util"];
const LATENCY_MARKERS: &[&str] = &["latency", "response_time", "rtt", "duration"];

fn name_has(name: &str, markers: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// `[start, end)` in UTC hours, wrapping past midnight when `start > end`.
pub fn in_off_hours(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        false
    } else if start < end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

/// Inputs a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicInput<'a> {
    pub name: &'a str,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub baseline: &'a BaselineSummary,
    pub seasonal: Option<&'a SeasonalProfile>,
}

fn network(input: &HeuristicInput<'_>, cfg: &HeuristicSettings, out: &mut Vec<Finding>) {
    let b = input.baseline;
    if b.p95() > 0.0 && input.value > b.p95() * cfg.spike_factor {
        out.push(Finding {
            rule: HeuristicRule::TrafficSpike,
            message: format!(
                "{} is {:.1}x the p95 of {:.3}",
                input.value,
                input.value / b.p95(),
                b.p95()
            ),
            boost: cfg.spike_boost,
            critical: false,
        });
    }
    if input.value == 0.0 && b.median > 0.0 {
        out.push(Finding {
            rule: HeuristicRule::TrafficDrop,
            message: format!("traffic dropped to zero from a median of {:.3}", b.median),
            boost: cfg.drop_boost,
            critical: false,
        });
    }
}

fn performance(input: &HeuristicInput<'_>, cfg: &HeuristicSettings, out: &mut Vec<Finding>) {
    if name_has(input.name, UTILIZATION_MARKERS) && input.value >= cfg.saturation_percent {
        out.push(Finding {
            rule: HeuristicRule::Saturation,
            message: format!(
                "utilization {:.1}% at or above {:.1}%",
                input.value, cfg.saturation_percent
            ),
            boost: cfg.saturation_boost,
            critical: true,
        });
    }
    let p95 = input.baseline.p95();
    if name_has(input.name, LATENCY_MARKERS) && p95 > 0.0 && input.value > p95 * cfg.latency_factor {
        out.push(Finding {
            rule: HeuristicRule::LatencyDegradation,
            message: format!("{} exceeds {:.1}x the p95 of {:.3}", input.value, cfg.latency_factor, p95),
            boost: cfg.latency_boost,
            critical: false,
        });
    }
}

fn security(input: &HeuristicInput<'_>, cfg: &HeuristicSettings, out: &mut Vec<Finding>) {
    let b = input.baseline;
    let ceiling = b.p99().max(b.mean + 3.0 * b.std_dev);
    if input.value >= cfg.min_burst_events && input.value > ceiling {
        out.push(Finding {
            rule: HeuristicRule::BurstActivity,
            message: format!("{} events against a normal ceiling of {:.1}", input.value, ceiling),
            boost: cfg.burst_boost,
            critical: true,
        });
    }

    let hour = input.timestamp.hour();
    if input.value > 0.0 && in_off_hours(hour, cfg.off_hours_start, cfg.off_hours_end) {
        let quiet = input
            .seasonal
            .and_then(|p| p.hourly.get(hour as usize))
            .map(|bucket| bucket.n == 0 || bucket.mean <= cfg.quiet_bucket_mean);
        if quiet == Some(true) {
            out.push(Finding {
                rule: HeuristicRule::OffHoursActivity,
                message: format!("activity at {:02}:00 UTC, normally quiet", hour),
                boost: cfg.off_hours_boost,
                critical: false,
            });
        }
    }
}

/// Apply the rules for the input's metric kind.
pub fn evaluate(input: &HeuristicInput<'_>, cfg: &HeuristicSettings) -> Vec<Finding> {
    let mut out = Vec::new();
    if !cfg.enabled {
        return out;
    }
    match input.kind {
        MetricKind::Network => network(input, cfg, &mut out),
        MetricKind::Performance => performance(input, cfg, &mut out),
        MetricKind::Security => security(input, cfg, &mut out),
        MetricKind::Generic => {}
    }
    out
}
