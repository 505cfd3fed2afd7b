use serde::Serialize;
use thiserror::Error;

use stockkeep_inventory::{InventoryError, StockKey};

use crate::service::BulkItemResult;
use crate::store::StorageError;

/// Failures reported by [`crate::InventoryService`].
///
/// Every variant means the failed operation left no partial state behind.
/// `BulkPartialFailure` is the exception by construction: it is only
/// produced in best-effort mode, where succeeded items stay committed.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InventoryServiceError {
    #[error("insufficient stock at {key}: {available} available, {requested} requested")]
    InsufficientStock {
        key: StockKey,
        available: i64,
        requested: i64,
    },

    #[error("insufficient reserved stock at {key}: {reserved} reserved, {requested} requested")]
    InsufficientReserved {
        key: StockKey,
        reserved: i64,
        requested: i64,
    },

    #[error("invalid movement input: {0}")]
    InvalidMovementInput(String),

    #[error("unknown movement type: {0}")]
    UnknownMovementType(String),

    #[error("stock record {0} is retired")]
    RecordRetired(StockKey),

    #[error("stock record {key} still holds stock: {available} available, {reserved} reserved")]
    StockOnHand {
        key: StockKey,
        available: i64,
        reserved: i64,
    },

    #[error("stock record {0} not found")]
    NotFound(StockKey),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Strict batch rolled back because of the item at `index`.
    #[error("batch rejected at item {index}: {source}")]
    BulkRejected {
        index: usize,
        source: Box<InventoryServiceError>,
    },

    /// Best-effort batch where at least one item failed.
    #[error("{} of {} batch items failed", failed_count(.results), .results.len())]
    BulkPartialFailure { results: Vec<BulkItemResult> },
}

fn failed_count(results: &[BulkItemResult]) -> usize {
    results.iter().filter(|r| r.outcome.is_err()).count()
}

impl InventoryServiceError {
    /// Attach the record key to a domain failure.
    pub fn from_domain(err: InventoryError, key: &StockKey) -> Self {
        match err {
            InventoryError::InsufficientStock {
                available,
                requested,
            } => Self::InsufficientStock {
                key: key.clone(),
                available,
                requested,
            },
            InventoryError::InsufficientReserved {
                reserved,
                requested,
            } => Self::InsufficientReserved {
                key: key.clone(),
                reserved,
                requested,
            },
            InventoryError::InvalidMovementInput(msg) => Self::InvalidMovementInput(msg),
            InventoryError::UnknownMovementType(t) => Self::UnknownMovementType(t),
            InventoryError::RecordRetired => Self::RecordRetired(key.clone()),
            InventoryError::StockOnHand {
                available,
                reserved,
            } => Self::StockOnHand {
                key: key.clone(),
                available,
                reserved,
            },
        }
    }

    /// Whether the whole operation can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::BulkRejected { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Domain failures without a record key (input parsing, batch size).
impl From<InventoryError> for InventoryServiceError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidMovementInput(msg) => Self::InvalidMovementInput(msg),
            InventoryError::UnknownMovementType(t) => Self::UnknownMovementType(t),
            other => Self::InvalidMovementInput(other.to_string()),
        }
    }
}
