//! Reconcile stock records against the movement ledger.
//!
//! Usage: `stockkeep-audit [--location <name>]`
//!
//! Prints the validation report as JSON and exits with status 2 when any
//! record disagrees with its ledger.

use std::process::ExitCode;

use anyhow::{Context, bail};

use stockkeep_events::NoopEventBus;
use stockkeep_infra::{InventoryConfig, InventoryService, PostgresStockStore};
use stockkeep_inventory::Location;

fn parse_location(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<Location>> {
    let mut location = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--location" | "-l" => {
                let value = args.next().context("--location needs a value")?;
                location = Some(Location::new(&value)?);
            }
            other => bail!("unexpected argument: {other}"),
        }
    }
    Ok(location)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    stockkeep_observability::init();

    let location = parse_location(std::env::args().skip(1))?;
    let config = InventoryConfig::load().context("loading configuration")?;
    if config.database.url.is_none() {
        bail!("database.url is not set (STOCKKEEP__DATABASE__URL)");
    }

    let store = PostgresStockStore::connect(&config.database)
        .await
        .context("connecting to postgres")?;
    store.ensure_schema().await.context("applying schema")?;

    let service = InventoryService::new(store, NoopEventBus, config);
    let report = service
        .validate_stock_levels(location.as_ref())
        .await
        .context("validating stock levels")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_consistent() {
        tracing::info!(checked = report.checked, "stock levels consistent");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}
