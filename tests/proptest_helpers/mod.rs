#![allow(dead_code)]

use chrono::{DateTime, Utc};
use dataport::format::LogicalFormat;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Whole-second instants between 2000-01-01 and 2100-01-01.
pub fn arb_instant() -> BoxedStrategy<DateTime<Utc>> {
    (946_684_800i64..4_102_444_800i64)
        .prop_filter_map("representable instant", |secs| {
            DateTime::<Utc>::from_timestamp(secs, 0)
        })
        .boxed()
}

pub fn arb_logical_format() -> BoxedStrategy<LogicalFormat> {
    proptest::sample::select(LogicalFormat::ALL.to_vec()).boxed()
}

/// Render `instant` in one of the layouts the service is known to send.
pub fn render(instant: DateTime<Utc>, layout: usize) -> String {
    match layout % 3 {
        0 => instant.to_rfc3339(),
        1 => instant.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => {
            let offset = chrono::FixedOffset::east_opt(8 * 3600).expect("valid offset");
            instant.with_timezone(&offset).to_rfc3339()
        }
    }
}
