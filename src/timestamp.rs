//! Timestamp parsing for remote modification and completion times.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::DataportError;

const NAIVE_LAYOUTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a remote timestamp.
///
/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`, `2024-01-01T08:00:00+08:00`) and
/// offset-less `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`, which are read as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DataportError> {
    let trimmed = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(naive.and_utc());
        }
    }

    Err(DataportError::InvalidTimestamp {
        value: value.to_string(),
    })
}
