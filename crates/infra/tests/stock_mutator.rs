mod common;

use std::sync::Arc;

use stockkeep_events::{EventBus, Subscription};
use stockkeep_infra::{
    InMemoryStockStore, InventoryConfig, InventoryService, InventoryServiceError, MovementFilter,
    Pagination,
};
use stockkeep_inventory::{InventoryEvent, MovementType, Severity};

use common::*;

#[tokio::test]
async fn sale_scenario_ends_in_warning_band() {
    let svc = service();
    let main = new_key("main");
    let actor = staff();

    svc.set_reorder_level(&main, 20, actor).await.unwrap();
    stock_up(&svc, &main, 10).await;

    let receipt = svc
        .apply_movement(change(&main, MovementType::Sale, 3), actor)
        .await
        .unwrap();

    assert_eq!(receipt.record.quantity_available, 7);
    assert_eq!(receipt.record.quantity_sold, 3);
    assert_eq!(receipt.movement.quantity, -3);
    assert_eq!(receipt.movement.movement_type, MovementType::Sale);
    assert_eq!(receipt.movement.performed_by, actor);

    let sales: Vec<_> = ledger_for(&svc, &main)
        .await
        .into_iter()
        .filter(|m| m.movement_type == MovementType::Sale)
        .collect();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].quantity, -3);

    let alerts = svc.detect_low_stock(Some(&main.location), None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Warning);
    assert_eq!(alerts[0].stock_percentage, 35.0);
}

#[tokio::test]
async fn overselling_fails_and_writes_nothing() {
    let svc = service();
    let k = new_key("main");
    stock_up(&svc, &k, 4).await;
    let before = svc.stock_record(&k).await.unwrap();

    let err = svc
        .apply_movement(change(&k, MovementType::Sale, 5), None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        InventoryServiceError::InsufficientStock {
            key: k.clone(),
            available: 4,
            requested: 5
        }
    );
    assert!(!err.is_retryable());
    assert_eq!(svc.stock_record(&k).await.unwrap(), before);
    assert_eq!(ledger_for(&svc, &k).await.len(), 1);
}

#[tokio::test]
async fn failed_first_movement_does_not_create_a_record() {
    let svc = service();
    let k = new_key("main");

    let err = svc
        .apply_movement(change(&k, MovementType::Damage, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryServiceError::InsufficientStock { .. }));
    assert_eq!(svc.stock_record(&k).await.unwrap(), None);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_write() {
    let svc = service();
    let k = new_key("main");

    for bad in [
        change(&k, MovementType::Purchase, 0),
        change(&k, MovementType::Transfer, 5),
    ] {
        let err = svc.apply_movement(bad, None).await.unwrap_err();
        assert!(matches!(err, InventoryServiceError::InvalidMovementInput(_)));
    }
    assert_eq!(svc.store().movement_count().unwrap(), 0);
}

#[tokio::test]
async fn reservations_hold_units_until_released() {
    let svc = service();
    let k = new_key("main");
    stock_up(&svc, &k, 10).await;

    let held = svc
        .apply_movement(change(&k, MovementType::Reservation, 4), None)
        .await
        .unwrap();
    assert_eq!(held.record.quantity_available, 6);
    assert_eq!(held.record.quantity_reserved, 4);
    assert_eq!(held.record.on_hand(), 10);

    let err = svc
        .apply_movement(change(&k, MovementType::Release, 5), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        InventoryServiceError::InsufficientReserved {
            key: k.clone(),
            reserved: 4,
            requested: 5
        }
    );

    let released = svc
        .apply_movement(change(&k, MovementType::Release, 4), None)
        .await
        .unwrap();
    assert_eq!(released.record.quantity_available, 10);
    assert_eq!(released.record.quantity_reserved, 0);
    assert_eq!(released.record.version, 3);
}

#[tokio::test]
async fn negative_adjustment_is_bounded_by_available() {
    let svc = service();
    let k = new_key("main");
    stock_up(&svc, &k, 3).await;

    let ok = svc
        .apply_movement(
            change(&k, MovementType::Adjustment, -2).with_reason("cycle count"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(ok.record.quantity_available, 1);
    assert_eq!(ok.movement.reason.as_deref(), Some("cycle count"));

    let err = svc
        .apply_movement(change(&k, MovementType::Adjustment, -2), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryServiceError::InsufficientStock { available: 1, requested: 2, .. }
    ));
}

#[tokio::test]
async fn retired_records_refuse_movements_until_reactivated() {
    let svc = service();
    let k = new_key("main");
    stock_up(&svc, &k, 2).await;

    let err = svc.retire_record(&k, None).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryServiceError::StockOnHand { available: 2, reserved: 0, .. }
    ));

    svc.apply_movement(change(&k, MovementType::Sale, 2), None)
        .await
        .unwrap();
    let retired = svc.retire_record(&k, None).await.unwrap();
    assert!(!retired.active);

    let err = svc
        .apply_movement(change(&k, MovementType::Purchase, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err, InventoryServiceError::RecordRetired(k.clone()));

    svc.reactivate_record(&k, None).await.unwrap();
    stock_up(&svc, &k, 1).await;
    assert_eq!(available(&svc, &k).await, 1);
}

#[tokio::test]
async fn retiring_an_unknown_key_is_not_found() {
    let svc = service();
    let k = new_key("main");
    assert_eq!(
        svc.retire_record(&k, None).await.unwrap_err(),
        InventoryServiceError::NotFound(k.clone())
    );
}

#[tokio::test]
async fn reorder_level_changes_do_not_touch_the_ledger() {
    let svc = service();
    let k = new_key("main");

    let record = svc.set_reorder_level(&k, 15, None).await.unwrap();
    assert_eq!(record.reorder_level, 15);
    assert_eq!(record.version, 0);
    assert!(svc.set_reorder_level(&k, -1, None).await.is_err());
    assert_eq!(svc.store().movement_count().unwrap(), 0);
}

#[tokio::test]
async fn committed_changes_are_published() {
    let svc = service();
    let events: Subscription<InventoryEvent> = svc.bus().subscribe();
    let k = new_key("main");

    stock_up(&svc, &k, 5).await;
    let _ = svc
        .apply_movement(change(&k, MovementType::Sale, 50), None)
        .await;
    svc.set_reorder_level(&k, 3, None).await.unwrap();

    let published = events.drain();
    assert_eq!(published.len(), 2);
    match &published[0] {
        InventoryEvent::MovementRecorded {
            movement,
            quantity_available,
            ..
        } => {
            assert_eq!(movement.key, k);
            assert_eq!(*quantity_available, 5);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        published[1],
        InventoryEvent::ReorderLevelChanged { reorder_level: 3, .. }
    ));
}

#[tokio::test]
async fn publish_failures_do_not_fail_committed_writes() {
    let svc = InventoryService::new(
        InMemoryStockStore::new(),
        Arc::new(FailingBus),
        InventoryConfig::default(),
    );
    let k = new_key("main");

    let receipt = svc
        .apply_movement(change(&k, MovementType::Purchase, 5), None)
        .await
        .unwrap();
    assert_eq!(receipt.record.quantity_available, 5);
    assert_eq!(available(&svc, &k).await, 5);
}

#[tokio::test]
async fn storage_failure_rolls_back_and_is_retryable() {
    let store = FlakyStore::new();
    let svc = InventoryService::new(
        store.clone(),
        Arc::new(FailingBus),
        InventoryConfig::default(),
    );
    let k = new_key("main");
    stock_up(&svc, &k, 5).await;
    let before = svc.stock_record(&k).await.unwrap();

    store.fail_after(0);
    let err = svc
        .apply_movement(change(&k, MovementType::Sale, 1), None)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(svc.stock_record(&k).await.unwrap(), before);
    assert_eq!(store.inner.movement_count().unwrap(), 1);

    // The injected failure is spent; a retry goes through.
    svc.apply_movement(change(&k, MovementType::Sale, 1), None)
        .await
        .unwrap();
    assert_eq!(available(&svc, &k).await, 4);
}

#[tokio::test]
async fn receipts_and_events_carry_the_stored_timestamp() {
    let svc = service();
    let events: Subscription<InventoryEvent> = svc.bus().subscribe();
    let k = new_key("main");

    let receipt = svc
        .apply_movement(change(&k, MovementType::Purchase, 3), None)
        .await
        .unwrap();
    let created_at = receipt.movement.created_at;
    assert_eq!(created_at.timestamp_subsec_nanos() % 1_000, 0);
    assert_eq!(receipt.record.updated_at, created_at);

    assert_eq!(ledger_for(&svc, &k).await, vec![receipt.movement.clone()]);

    let since = MovementFilter {
        product_id: Some(k.product_id),
        created_after: Some(created_at),
        ..Default::default()
    };
    let page = svc.list_movements(&since, Pagination::default()).await.unwrap();
    assert_eq!(page.movements, vec![receipt.movement.clone()]);

    match events.drain().as_slice() {
        [InventoryEvent::MovementRecorded { movement, .. }] => {
            assert_eq!(movement, &receipt.movement)
        }
        other => panic!("unexpected events {other:?}"),
    }
}
