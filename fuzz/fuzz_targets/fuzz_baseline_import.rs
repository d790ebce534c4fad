//! Fuzz target for baseline export documents received from other instances.

#![no_main]

use dw_core::baseline::BaselineExport;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<BaselineExport>(data);
});
