//! Transactional storage boundary for stock records and the movement ledger.
//!
//! Two tables sit behind these traits: current stock records and the
//! append-only movement ledger, related by (product, variant, location).
//! Every mutation runs inside a [`StockTransaction`]; the service layer is
//! the only writer.

pub mod in_memory;
pub mod postgres;
pub mod query;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use stockkeep_inventory::{LedgerTotals, Location, Movement, StockKey, StockRecord};

pub use in_memory::{InMemoryStockStore, InMemoryTransaction};
pub use postgres::{PostgresStockStore, PostgresTransaction};
pub use query::{MovementFilter, MovementPage, Pagination};

/// Storage-layer failure.
///
/// When any of these is returned from inside a transaction, the transaction
/// has written nothing that other readers can observe.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StorageError {
    /// Lost a race: deadlock, serialization failure, lock timeout.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Backend unreachable, pool exhausted or closed, statement timed out.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict(_) | StorageError::Unavailable(_))
    }
}

/// Records and per-key ledger totals read from one consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub records: Vec<StockRecord>,
    pub totals: HashMap<StockKey, LedgerTotals>,
}

/// One open read-write transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StockTransaction: Send {
    /// Lock the record for `key` until the transaction ends, creating an
    /// empty record first if the key has never been seen.
    async fn lock_record(&mut self, key: &StockKey) -> Result<StockRecord, StorageError>;

    /// Lock an existing record; `None` if the key has never been seen.
    async fn lock_existing(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError>;

    /// Overwrite a record previously locked in this transaction.
    async fn save_record(&mut self, record: &StockRecord) -> Result<(), StorageError>;

    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StorageError>;

    async fn commit(self) -> Result<(), StorageError>;

    async fn rollback(self) -> Result<(), StorageError>;
}

/// Durable home of stock records and the movement ledger.
///
/// Read methods never block writers for longer than a single statement
/// and never observe a half-applied transaction.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTransaction + 'static;

    async fn begin(&self) -> Result<Self::Tx, StorageError>;

    async fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError>;

    /// All records, optionally restricted to one location, in key order.
    async fn stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<StockRecord>, StorageError>;

    /// Records plus ledger totals for reconciliation, from a single snapshot.
    async fn ledger_snapshot(
        &self,
        location: Option<&Location>,
    ) -> Result<LedgerSnapshot, StorageError>;

    /// Newest-first page of ledger rows.
    async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StorageError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        (**self).begin().await
    }

    async fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        (**self).stock_record(key).await
    }

    async fn stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<StockRecord>, StorageError> {
        (**self).stock_levels(location).await
    }

    async fn ledger_snapshot(
        &self,
        location: Option<&Location>,
    ) -> Result<LedgerSnapshot, StorageError> {
        (**self).ledger_snapshot(location).await
    }

    async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StorageError> {
        (**self).query_movements(filter, pagination).await
    }
}
