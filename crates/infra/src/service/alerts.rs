//! Alert Engine. Read-only; works on one committed view of the records.

use tracing::instrument;

use stockkeep_events::EventBus;
use stockkeep_inventory::{Alert, Dashboard, InventoryEvent, Location};

use super::InventoryService;
use crate::error::InventoryServiceError;
use crate::store::StockStore;

impl<S, B> InventoryService<S, B>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    /// Low-stock alerts, most urgent first.
    ///
    /// `threshold_multiplier` defaults to `alerts.default_threshold_multiplier`.
    #[instrument(skip(self), fields(location = ?location.map(Location::as_str)), err)]
    pub async fn detect_low_stock(
        &self,
        location: Option<&Location>,
        threshold_multiplier: Option<f64>,
    ) -> Result<Vec<Alert>, InventoryServiceError> {
        let multiplier =
            threshold_multiplier.unwrap_or(self.config.alerts.default_threshold_multiplier);
        stockkeep_inventory::validate_multiplier(multiplier)?;

        let records = self.store.stock_levels(location).await?;
        Ok(stockkeep_inventory::detect_low_stock(&records, multiplier)?)
    }

    #[instrument(skip(self), fields(location = ?location.map(Location::as_str)), err)]
    pub async fn dashboard(
        &self,
        location: Option<&Location>,
    ) -> Result<Dashboard, InventoryServiceError> {
        let records = self.store.stock_levels(location).await?;
        Ok(Dashboard::build(
            &records,
            self.config.alerts.default_threshold_multiplier,
            self.config.alerts.priority_limit,
        )?)
    }
}
