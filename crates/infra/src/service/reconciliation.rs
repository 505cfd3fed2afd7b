use chrono::Utc;
use tracing::instrument;

use stockkeep_events::EventBus;
use stockkeep_inventory::{InventoryEvent, Location, ValidationReport, reconcile};

use super::InventoryService;
use crate::error::InventoryServiceError;
use crate::store::StockStore;

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Compare every record with its ledger. Reports drift, never fixes it.
    ///
    /// Takes no row locks; reads one consistent snapshot.
    #[instrument(skip(self), fields(location = ?location.map(Location::as_str)), err)]
    pub async fn validate_stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<ValidationReport, InventoryServiceError> {
        let snapshot = self.store.ledger_snapshot(location).await?;
        let report = reconcile(
            location.cloned(),
            &snapshot.records,
            &snapshot.totals,
            Utc::now(),
        );

        if !report.is_consistent() {
            tracing::warn!(
                checked = report.checked,
                mismatches = report.mismatches.len(),
                "stock records disagree with the movement ledger"
            );
        }
        Ok(report)
    }
}
