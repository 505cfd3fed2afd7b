//! Inventory accounting domain.
//!
//! Pure, deterministic rules for per-location stock: the movement ledger
//! vocabulary, the `StockRecord` aggregate that validates and applies signed
//! movements, low-stock classification, reconciliation of records against
//! ledger totals, and the request types for bulk and transfer operations.
//! No IO and no storage: callers pass timestamps in.

pub mod alert;
pub mod bulk;
pub mod error;
pub mod event;
pub mod key;
pub mod movement;
pub mod reconciliation;
pub mod record;
pub mod transfer;

pub use alert::{
    Alert, Dashboard, Severity, SeverityCounts, classify, detect_low_stock, validate_multiplier,
};
pub use bulk::{BulkMode, check_batch_size, lock_order, validate_batch};
pub use error::InventoryError;
pub use event::InventoryEvent;
pub use key::{Location, StockKey};
pub use movement::{
    Direction, Movement, MovementType, RawStockChange, RecordMovement, StockChange,
};
pub use reconciliation::{LedgerTotals, ReconciliationError, ValidationReport, reconcile};
pub use record::StockRecord;
pub use transfer::{TransferPair, TransferRequest, new_transfer_reference};
