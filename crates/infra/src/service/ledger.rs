use tracing::instrument;

use stockkeep_events::EventBus;
use stockkeep_inventory::InventoryEvent;

use super::InventoryService;
use crate::error::InventoryServiceError;
use crate::store::{MovementFilter, MovementPage, Pagination, StockStore};

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Audit trail: newest movements first, then by id.
    #[instrument(skip(self, filter), fields(limit = pagination.limit, offset = pagination.offset), err)]
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, InventoryServiceError> {
        if let (Some(after), Some(before)) = (filter.created_after, filter.created_before) {
            if after > before {
                return Err(InventoryServiceError::InvalidMovementInput(
                    "created_after is later than created_before".to_string(),
                ));
            }
        }
        Ok(self.store.query_movements(filter, pagination).await?)
    }
}
