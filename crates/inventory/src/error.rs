use thiserror::Error;

use stockkeep_core::DomainError;

/// Business failures raised while deciding a stock change.
///
/// All of these are detected before anything is written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Applying the change would drive `quantity_available` below zero.
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    /// A release asked for more units than are currently held.
    #[error("insufficient reserved stock: {reserved} reserved, {requested} requested")]
    InsufficientReserved { reserved: i64, requested: i64 },

    #[error("invalid movement input: {0}")]
    InvalidMovementInput(String),

    #[error("unknown movement type: {0}")]
    UnknownMovementType(String),

    /// The record was soft-retired and accepts no further movements.
    #[error("stock record is retired")]
    RecordRetired,

    /// Retirement requires an empty record.
    #[error("stock still on hand: {available} available, {reserved} reserved")]
    StockOnHand { available: i64, reserved: i64 },
}

impl InventoryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidMovementInput(msg.into())
    }
}

impl From<DomainError> for InventoryError {
    fn from(value: DomainError) -> Self {
        Self::InvalidMovementInput(value.to_string())
    }
}
