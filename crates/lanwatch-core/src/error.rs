use thiserror::Error;

/// Errors from parsing or expanding an address range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Errors from the inventory store.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The backing store could not be reached or rejected the operation.
    /// Callers treat this as transient and retry on the next cycle.
    #[error("Inventory store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
