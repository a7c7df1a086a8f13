//! Fuzz target for cache manifest parsing and the staleness check built on it.

#![no_main]

use std::path::Path;

use dataport::cache::is_stale;
use dataport::remote::ExportTaskInfo;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Ok(manifest) = serde_json::from_slice::<ExportTaskInfo>(data) {
        let _ = is_stale(Path::new("info.json"), &manifest, "2024-01-01T00:00:00Z");
    }
});
