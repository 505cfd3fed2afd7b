//! Runs only when `STOCKKEEP_TEST_DATABASE_URL` points at a disposable
//! Postgres 15+ database.

mod common;

use std::sync::Arc;

use stockkeep_events::NoopEventBus;
use stockkeep_infra::{
    DatabaseConfig, InventoryConfig, InventoryService, InventoryServiceError, PostgresStockStore,
};
use stockkeep_inventory::{MovementType, TransferRequest};
use uuid::Uuid;

use common::*;

type PgService = InventoryService<PostgresStockStore, NoopEventBus>;

async fn pg_service() -> Option<PgService> {
    let url = std::env::var("STOCKKEEP_TEST_DATABASE_URL").ok()?;
    let config = InventoryConfig {
        database: DatabaseConfig {
            url: Some(url),
            max_connections: 8,
            acquire_timeout_secs: 5,
        },
        ..InventoryConfig::default()
    };
    let store = PostgresStockStore::connect(&config.database).await.unwrap();
    store.ensure_schema().await.unwrap();
    Some(InventoryService::new(store, NoopEventBus, config))
}

/// Location unique to this run so assertions ignore other data.
fn run_location(tag: &str) -> String {
    format!("{tag}-{}", Uuid::now_v7())
}

#[tokio::test]
async fn pg_movement_and_reconciliation() {
    let Some(svc) = pg_service().await else {
        return;
    };
    let place = run_location("main");
    let k = new_key(&place);

    stock_up(&svc, &k, 10).await;
    let receipt = svc
        .apply_movement(change(&k, MovementType::Sale, 3), staff())
        .await
        .unwrap();
    assert_eq!(receipt.record.quantity_available, 7);

    let err = svc
        .apply_movement(change(&k, MovementType::Sale, 8), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::InsufficientStock { available: 7, .. }));

    let report = svc.validate_stock_levels(Some(&loc(&place))).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.checked, 1);

    let ledger = ledger_for(&svc, &k).await;
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0], receipt.movement);
    assert_eq!(svc.stock_record(&k).await.unwrap(), Some(receipt.record));
}

#[tokio::test]
async fn pg_strict_bulk_is_atomic() {
    let Some(svc) = pg_service().await else {
        return;
    };
    let place = run_location("bulk");
    let a = new_key(&place);
    let b = new_key(&place);
    stock_up(&svc, &a, 5).await;

    let err = svc
        .apply_bulk(
            vec![
                change(&a, MovementType::Sale, 2),
                change(&b, MovementType::Purchase, 2),
                change(&a, MovementType::Sale, 4),
            ],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::BulkRejected { index: 2, .. }));
    assert_eq!(available(&svc, &a).await, 5);
    assert_eq!(svc.stock_record(&b).await.unwrap(), None);
}

#[tokio::test]
async fn pg_transfer_is_linked() {
    let Some(svc) = pg_service().await else {
        return;
    };
    let from = run_location("from");
    let to = run_location("to");
    let a = new_key(&from);
    stock_up(&svc, &a, 6).await;

    let receipt = svc
        .transfer(
            TransferRequest::new(a.product_id, None, 4, loc(&from), loc(&to)),
            None,
        )
        .await
        .unwrap();
    let found = svc
        .find_transfer(&receipt.pair.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, receipt.pair);
    assert_eq!(found.inbound.quantity, 4);
    assert_eq!(available(&svc, &a).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pg_competing_sales_are_serialized() {
    let Some(svc) = pg_service().await else {
        return;
    };
    let svc = Arc::new(svc);
    let k = new_key(&run_location("race"));
    stock_up(svc.as_ref(), &k, 10).await;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let svc = svc.clone();
            let k = k.clone();
            tokio::spawn(async move {
                svc.apply_movement(change(&k, MovementType::Sale, 6), None)
                    .await
            })
        })
        .collect();
    let mut ok = 0;
    for t in tasks {
        if t.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(available(svc.as_ref(), &k).await, 4);
}
