//! Transfer Coordinator.

use serde::Serialize;
use tracing::instrument;

use stockkeep_core::UserId;
use stockkeep_events::EventBus;
use stockkeep_inventory::{
    InventoryEvent, StockChange, StockRecord, TransferPair, TransferRequest, lock_order,
    new_transfer_reference,
};

use super::{InventoryService, abort, commit, record_change, write_time};
use crate::error::InventoryServiceError;
use crate::store::{MovementFilter, Pagination, StockStore, StockTransaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub pair: TransferPair,
    /// Source record after the out-leg.
    pub source: StockRecord,
    /// Destination record after the in-leg.
    pub destination: StockRecord,
}

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Move stock between two locations as one atomic pair of movements.
    ///
    /// Readers see both legs or neither.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            from = %request.from,
            to = %request.to,
            quantity = request.quantity
        ),
        err
    )]
    pub async fn transfer(
        &self,
        request: TransferRequest,
        actor: Option<UserId>,
    ) -> Result<TransferReceipt, InventoryServiceError> {
        request.validate()?;

        let reference = new_transfer_reference();
        let (out_leg, in_leg) = request.legs(&reference);

        let mut tx = self.begin().await?;
        let (outbound, inbound) = match apply_legs(&mut tx, &out_leg, &in_leg, actor).await {
            Ok(legs) => legs,
            Err(e) => return Err(abort(tx, e).await),
        };
        commit(tx).await?;

        self.publish([
            InventoryEvent::movement_recorded(&outbound.movement, &outbound.record),
            InventoryEvent::movement_recorded(&inbound.movement, &inbound.record),
        ]);

        Ok(TransferReceipt {
            pair: TransferPair {
                reference,
                outbound: outbound.movement,
                inbound: inbound.movement,
            },
            source: outbound.record,
            destination: inbound.record,
        })
    }

    /// Rebuild a transfer from the ledger by its shared reference.
    #[instrument(skip(self), err)]
    pub async fn find_transfer(
        &self,
        reference: &str,
    ) -> Result<Option<TransferPair>, InventoryServiceError> {
        // One extra row is enough to tell a pair from a malformed group.
        let page = self
            .store
            .query_movements(
                &MovementFilter::for_reference(reference),
                Pagination::new(Some(3), None),
            )
            .await?;
        Ok(TransferPair::from_movements(reference, &page.movements))
    }
}

async fn apply_legs<T: StockTransaction>(
    tx: &mut T,
    out_leg: &StockChange,
    in_leg: &StockChange,
    actor: Option<UserId>,
) -> Result<(super::MovementReceipt, super::MovementReceipt), InventoryServiceError> {
    for key in lock_order([out_leg, in_leg]) {
        tx.lock_record(&key).await?;
    }
    let now = write_time();
    let outbound = record_change(tx, out_leg, actor, now).await?;
    let inbound = record_change(tx, in_leg, actor, now).await?;
    Ok((outbound, inbound))
}
