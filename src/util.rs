//! Small helpers shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

/// The current time as signed seconds since the Unix epoch, the unit every
/// on-disk timestamp field uses.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
