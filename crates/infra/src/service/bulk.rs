//! Bulk Coordinator.
//!
//! Strict mode runs the whole batch in one transaction: keys are locked up
//! front in canonical order, items are applied in array order (so repeated
//! keys see each other's effects), and the first failure rolls back
//! everything. Best-effort mode commits each item on its own and reports
//! failures inline.

use serde::Serialize;
use tracing::instrument;

use stockkeep_core::UserId;
use stockkeep_events::EventBus;
use stockkeep_inventory::{
    BulkMode, InventoryEvent, StockChange, StockKey, check_batch_size, lock_order, validate_batch,
};

use super::{InventoryService, MovementReceipt, abort, commit, record_change, write_time};
use crate::error::InventoryServiceError;
use crate::store::{StockStore, StockTransaction};

/// Outcome of one batch item in best-effort mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemResult {
    pub index: usize,
    pub key: StockKey,
    pub outcome: Result<MovementReceipt, InventoryServiceError>,
}

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Apply a batch using the configured mode.
    pub async fn apply_bulk(
        &self,
        changes: Vec<StockChange>,
        actor: Option<UserId>,
    ) -> Result<Vec<MovementReceipt>, InventoryServiceError> {
        self.apply_bulk_with_mode(changes, actor, self.config.bulk.mode)
            .await
    }

    #[instrument(skip(self, changes), fields(items = changes.len(), mode = ?mode), err)]
    pub async fn apply_bulk_with_mode(
        &self,
        changes: Vec<StockChange>,
        actor: Option<UserId>,
        mode: BulkMode,
    ) -> Result<Vec<MovementReceipt>, InventoryServiceError> {
        match mode {
            BulkMode::Strict => self.apply_strict(&changes, actor).await,
            BulkMode::BestEffort => self.apply_best_effort(changes, actor).await,
        }
    }

    async fn apply_strict(
        &self,
        changes: &[StockChange],
        actor: Option<UserId>,
    ) -> Result<Vec<MovementReceipt>, InventoryServiceError> {
        validate_batch(changes, self.config.bulk.max_items).map_err(|(index, err)| match index {
            Some(i) => InventoryServiceError::BulkRejected {
                index: i,
                source: Box::new(InventoryServiceError::from_domain(err, &changes[i].key)),
            },
            None => err.into(),
        })?;

        let mut tx = self.begin().await?;
        let receipts = match apply_all(&mut tx, changes, actor).await {
            Ok(r) => r,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish(
            receipts
                .iter()
                .map(|r| InventoryEvent::movement_recorded(&r.movement, &r.record)),
        );
        Ok(receipts)
    }

    async fn apply_best_effort(
        &self,
        changes: Vec<StockChange>,
        actor: Option<UserId>,
    ) -> Result<Vec<MovementReceipt>, InventoryServiceError> {
        check_batch_size(changes.len(), self.config.bulk.max_items)?;

        let mut results = Vec::with_capacity(changes.len());
        for (index, change) in changes.into_iter().enumerate() {
            let key = change.key.clone();
            let outcome = self.apply_movement(change, actor).await;
            results.push(BulkItemResult {
                index,
                key,
                outcome,
            });
        }

        if results.iter().any(|r| r.outcome.is_err()) {
            let failed = results.iter().filter(|r| r.outcome.is_err()).count();
            tracing::debug!(failed, total = results.len(), "best-effort batch had failures");
            return Err(InventoryServiceError::BulkPartialFailure { results });
        }
        Ok(results.into_iter().filter_map(|r| r.outcome.ok()).collect())
    }
}

async fn apply_all<T: StockTransaction>(
    tx: &mut T,
    changes: &[StockChange],
    actor: Option<UserId>,
) -> Result<Vec<MovementReceipt>, InventoryServiceError> {
    for key in lock_order(changes) {
        tx.lock_record(&key).await?;
    }

    let mut receipts = Vec::with_capacity(changes.len());
    for (index, change) in changes.iter().enumerate() {
        let receipt = record_change(tx, change, actor, write_time())
            .await
            .map_err(|e| InventoryServiceError::BulkRejected {
                index,
                source: Box::new(e),
            })?;
        receipts.push(receipt);
    }
    Ok(receipts)
}
