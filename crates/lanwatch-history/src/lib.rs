//! LAN Watch liveness history.
//!
//! Every probe completion (manual check, scheduled sweep, reconciliation)
//! appends one [`LivenessRecord`] per host. The ledger is append-only and
//! bounded: after each append the host's records are pruned to the newest
//! [`MAX_RECORDS_PER_HOST`]. Uptime is never stored; it is derived from the
//! ledger over a trailing window.

pub mod store;
pub mod uptime;

use std::time::Duration;

pub use lanwatch_core::LivenessRecord;
pub use store::{FileHistoryStore, HistoryError, HistoryStore, MemoryHistoryStore};
pub use uptime::uptime_percentage;

/// Records retained per host.
pub const MAX_RECORDS_PER_HOST: usize = 1000;

/// Default trailing window for uptime: 24 hours.
pub const DEFAULT_UPTIME_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
