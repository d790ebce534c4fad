//! Fuzz target for driftwatch.json parsing and semantic validation.

#![no_main]

use dw_config::{validate_config, EngineConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation should only ever return errors.
    if let Ok(cfg) = EngineConfig::from_json(data) {
        let _ = validate_config(&cfg);
    }
});
