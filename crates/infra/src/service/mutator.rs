//! Stock Mutator: single movements and record maintenance.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use stockkeep_core::UserId;
use stockkeep_events::EventBus;
use stockkeep_inventory::{InventoryEvent, Movement, StockChange, StockKey, StockRecord};

use super::{InventoryService, abort, commit, record_change, write_time};
use crate::error::InventoryServiceError;
use crate::store::{StockStore, StockTransaction};

/// Post-commit state of a record together with the movement that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementReceipt {
    pub record: StockRecord,
    pub movement: Movement,
}

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Apply one movement atomically.
    ///
    /// Exactly one ledger row is written on success; nothing on failure.
    #[instrument(
        skip(self, change),
        fields(
            key = %change.key,
            movement_type = %change.movement_type,
            quantity = change.quantity
        ),
        err
    )]
    pub async fn apply_movement(
        &self,
        change: StockChange,
        actor: Option<UserId>,
    ) -> Result<MovementReceipt, InventoryServiceError> {
        change
            .validate_standalone()
            .map_err(|e| InventoryServiceError::from_domain(e, &change.key))?;

        let mut tx = self.begin().await?;
        let receipt = match record_change(&mut tx, &change, actor, write_time()).await {
            Ok(r) => r,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish([InventoryEvent::movement_recorded(
            &receipt.movement,
            &receipt.record,
        )]);
        Ok(receipt)
    }

    /// Set the alert threshold, creating the record if needed.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn set_reorder_level(
        &self,
        key: &StockKey,
        level: i64,
        actor: Option<UserId>,
    ) -> Result<StockRecord, InventoryServiceError> {
        if level < 0 {
            return Err(InventoryServiceError::InvalidMovementInput(
                "reorder level cannot be negative".to_string(),
            ));
        }

        let now = write_time();
        let mut tx = self.begin().await?;
        let record = match set_level(&mut tx, key, level, now).await {
            Ok(r) => r,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish([InventoryEvent::ReorderLevelChanged {
            key: key.clone(),
            reorder_level: level,
            changed_by: actor,
            occurred_at: now,
        }]);
        Ok(record)
    }

    /// Soft-retire an empty record; it then refuses movements.
    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn retire_record(
        &self,
        key: &StockKey,
        actor: Option<UserId>,
    ) -> Result<StockRecord, InventoryServiceError> {
        let now = write_time();
        let mut tx = self.begin().await?;
        let record = match toggle_active(&mut tx, key, false, now).await {
            Ok(r) => r,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish([InventoryEvent::RecordRetired {
            key: key.clone(),
            changed_by: actor,
            occurred_at: now,
        }]);
        Ok(record)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn reactivate_record(
        &self,
        key: &StockKey,
        actor: Option<UserId>,
    ) -> Result<StockRecord, InventoryServiceError> {
        let now = write_time();
        let mut tx = self.begin().await?;
        let record = match toggle_active(&mut tx, key, true, now).await {
            Ok(r) => r,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish([InventoryEvent::RecordReactivated {
            key: key.clone(),
            changed_by: actor,
            occurred_at: now,
        }]);
        Ok(record)
    }

    /// Current committed state; `None` if the key never held stock.
    pub async fn stock_record(
        &self,
        key: &StockKey,
    ) -> Result<Option<StockRecord>, InventoryServiceError> {
        Ok(self.store.stock_record(key).await?)
    }
}

async fn set_level<T: StockTransaction>(
    tx: &mut T,
    key: &StockKey,
    level: i64,
    now: chrono::DateTime<Utc>,
) -> Result<StockRecord, InventoryServiceError> {
    let mut record = tx.lock_record(key).await?;
    record
        .set_reorder_level(level, now)
        .map_err(|e| InventoryServiceError::from_domain(e, key))?;
    tx.save_record(&record).await?;
    Ok(record)
}

async fn toggle_active<T: StockTransaction>(
    tx: &mut T,
    key: &StockKey,
    active: bool,
    now: chrono::DateTime<Utc>,
) -> Result<StockRecord, InventoryServiceError> {
    let mut record = tx
        .lock_existing(key)
        .await?
        .ok_or_else(|| InventoryServiceError::NotFound(key.clone()))?;
    if active {
        record.reactivate(now);
    } else {
        record
            .retire(now)
            .map_err(|e| InventoryServiceError::from_domain(e, key))?;
    }
    tx.save_record(&record).await?;
    Ok(record)
}
