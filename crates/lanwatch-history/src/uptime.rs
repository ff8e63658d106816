//! Rolling uptime over a trailing window.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lanwatch_core::LivenessRecord;

/// Percentage of `records` observed online within `window` before `now`.
///
/// Returns exactly `100.0` when no record falls in the window: a host with no
/// history is reported as fully up.
pub fn uptime_percentage(records: &[LivenessRecord], now: DateTime<Utc>, window: Duration) -> f64 {
    let cutoff = window_start(now, window);

    let (online, total) = records
        .iter()
        .filter(|r| r.observed_at >= cutoff)
        .fold((0u64, 0u64), |(online, total), r| {
            (online + u64::from(r.status.is_online()), total + 1)
        });

    if total == 0 {
        return 100.0;
    }
    100.0 * online as f64 / total as f64
}

/// The earliest timestamp inside the window.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
