//! lanwatch-discover: Liveness probing and subnet discovery for LAN Watch.
//!
//! Probes single hosts through a layered strategy (URL, ICMP echo, TCP
//! ports), sweeps /24-/30 subnets in bounded batches, reconciles what it
//! finds into the inventory, and re-runs sweeps on a per-network schedule.

pub mod config;
pub mod connect;
pub mod echo;
pub mod error;
pub mod http;
pub mod monitor;
pub mod probe;
pub mod reconcile;
pub mod resolve;
pub mod scheduler;
pub mod sweep;

#[cfg(test)]
mod testing;

pub use error::{DiscoverError, Result};
pub use monitor::{ManualSweep, NetworkMonitor, SweepReport};
pub use probe::LivenessProbe;
pub use reconcile::ReconcileSummary;
pub use scheduler::ScanScheduler;
pub use sweep::{NetworkSweeper, SweepOptions, SweepOutcome, SweepProgress};
