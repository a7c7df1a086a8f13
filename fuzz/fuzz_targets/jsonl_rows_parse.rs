//! Fuzz target for JSONL row parsing.
//!
//! Feeds arbitrary text to the row parser used for cached `.jsonl` content,
//! checking for panics, crashes, or hangs.

#![no_main]

use dataport::table::from_jsonl_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = from_jsonl_str(text);
    }
});
