//! Fuzz target for JSONL metric line parsing and validation.
//!
//! Arbitrary lines must yield a point or an ingestion error, never a panic.

#![no_main]

use chrono::{TimeZone, Utc};
use dw_config::IngestionSettings;
use dw_core::ingest::{is_skippable, parse_line, validate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if is_skippable(data) {
        return;
    }
    let Ok(raw) = parse_line(data) else {
        return;
    };
    let now = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
    if let Ok(point) = validate(raw, now, &IngestionSettings::default()) {
        assert!(point.value.is_finite());
        assert!(!point.name.is_empty());
    }
});
