// Time Conversion Helpers

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Converts unix milliseconds into a UTC datetime.
/// Out-of-range values clamp to the epoch.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Converts a UTC datetime into unix milliseconds.
pub fn datetime_to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Duration elapsed between two unix-millisecond instants.
/// Returns zero when `since` is not in the past.
pub fn millis_between(since: i64, now: i64) -> Duration {
    Duration::from_millis(now.saturating_sub(since).max(0) as u64)
}
