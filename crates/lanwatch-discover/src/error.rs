//! Error types for the lanwatch-discover crate.

use lanwatch_core::{HostId, InventoryError, NetworkId, RangeError};
use lanwatch_history::HistoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Network not found: {0}")]
    NetworkNotFound(NetworkId),

    #[error("Host not found: {0}")]
    HostNotFound(HostId),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// True for store outages that the next cycle should simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Inventory(e) => e.is_transient(),
            Self::History(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
