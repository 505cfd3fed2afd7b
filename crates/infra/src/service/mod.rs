//! `InventoryService`: the only writer of stock records and the ledger.
//!
//! Every mutating operation follows the same shape:
//! validate input, open one transaction, lock the affected records in
//! `StockKey` order, decide and apply movements through the `StockRecord`
//! aggregate, commit, then publish change notifications.

mod alerts;
mod bulk;
mod ledger;
mod mutator;
mod reconciliation;
mod transfer;

pub use bulk::BulkItemResult;
pub use mutator::MovementReceipt;
pub use transfer::TransferReceipt;

use chrono::{DateTime, SubsecRound, Utc};

use stockkeep_core::{Aggregate, MovementId, UserId};
use stockkeep_events::{Event, EventBus};
use stockkeep_inventory::{InventoryEvent, StockChange};

use crate::config::InventoryConfig;
use crate::error::InventoryServiceError;
use crate::store::{StockStore, StockTransaction};

pub struct InventoryService<S, B> {
    store: S,
    bus: B,
    config: InventoryConfig,
}

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    pub fn new(store: S, bus: B, config: InventoryConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Notify subscribers of committed changes.
    ///
    /// The write is already durable, so a failed publish is logged and
    /// never reported as an operation failure.
    fn publish(&self, events: impl IntoIterator<Item = InventoryEvent>) {
        for event in events {
            let event_type = event.event_type();
            let key = event.key().to_string();
            if let Err(err) = self.bus.publish(event) {
                tracing::warn!(event_type, key = %key, error = ?err, "failed to publish inventory event");
            }
        }
    }

    async fn begin(&self) -> Result<S::Tx, InventoryServiceError> {
        Ok(self.store.begin().await?)
    }
}

/// Timestamp for a write, truncated to the microsecond precision the ledger
/// stores so receipts and events carry the persisted value.
fn write_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Lock, decide, apply and persist one change inside an open transaction.
///
/// On error the caller must abandon the transaction.
async fn record_change<T>(
    tx: &mut T,
    change: &StockChange,
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<MovementReceipt, InventoryServiceError>
where
    T: StockTransaction,
{
    let key = &change.key;
    let mut record = tx.lock_record(key).await?;

    let command = change
        .to_command(MovementId::new(), actor, now)
        .map_err(|e| InventoryServiceError::from_domain(e, key))?;
    let mut movements = record
        .handle(&command)
        .map_err(|e| InventoryServiceError::from_domain(e, key))?;

    for m in &movements {
        record.apply(m);
    }
    tx.save_record(&record).await?;
    for m in &movements {
        tx.append_movement(m).await?;
    }

    let movement = movements
        .pop()
        .ok_or_else(|| InventoryServiceError::InvalidMovementInput("no movement recorded".into()))?;
    Ok(MovementReceipt { record, movement })
}

/// Roll back after a failure and hand the original error back.
async fn abort<T>(tx: T, err: InventoryServiceError) -> InventoryServiceError
where
    T: StockTransaction,
{
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "rollback failed after {err}");
    }
    err
}

async fn commit<T>(tx: T) -> Result<(), InventoryServiceError>
where
    T: StockTransaction,
{
    Ok(tx.commit().await?)
}
