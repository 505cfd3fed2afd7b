#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc;

use async_trait::async_trait;

use stockkeep_core::{ProductId, UserId};
use stockkeep_events::{EventBus, InMemoryEventBus, Subscription};
use stockkeep_infra::store::InMemoryTransaction;
use stockkeep_infra::{
    InMemoryStockStore, InventoryConfig, InventoryService, LedgerSnapshot, MovementFilter,
    MovementPage, Pagination, StockStore, StockTransaction, StorageError,
};
use stockkeep_inventory::{
    InventoryEvent, Location, Movement, MovementType, StockChange, StockKey, StockRecord,
};

pub type Bus = Arc<InMemoryEventBus<InventoryEvent>>;
pub type MemService = InventoryService<InMemoryStockStore, Bus>;

pub fn loc(name: &str) -> Location {
    Location::new(name).unwrap()
}

pub fn key_at(product: ProductId, location: &str) -> StockKey {
    StockKey::new(product, None, loc(location))
}

pub fn new_key(location: &str) -> StockKey {
    key_at(ProductId::new(), location)
}

pub fn change(key: &StockKey, movement_type: MovementType, quantity: i64) -> StockChange {
    StockChange::new(key.clone(), movement_type, quantity)
}

pub fn service() -> MemService {
    service_with(InventoryConfig::default())
}

pub fn service_with(config: InventoryConfig) -> MemService {
    InventoryService::new(InMemoryStockStore::new(), Arc::new(InMemoryEventBus::new()), config)
}

pub fn staff() -> Option<UserId> {
    Some(UserId::new())
}

/// Purchase `quantity` units at `key`.
pub async fn stock_up<S, B>(svc: &InventoryService<S, B>, key: &StockKey, quantity: i64)
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    svc.apply_movement(change(key, MovementType::Purchase, quantity), None)
        .await
        .unwrap();
}

pub async fn available<S, B>(svc: &InventoryService<S, B>, key: &StockKey) -> i64
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    svc.stock_record(key)
        .await
        .unwrap()
        .map(|r| r.quantity_available)
        .unwrap_or(0)
}

pub async fn ledger_for<S, B>(svc: &InventoryService<S, B>, key: &StockKey) -> Vec<Movement>
where
    S: StockStore,
    B: EventBus<InventoryEvent>,
{
    let filter = MovementFilter {
        product_id: Some(key.product_id),
        location: Some(key.location.clone()),
        ..Default::default()
    };
    svc.list_movements(&filter, Pagination::new(Some(1000), None))
        .await
        .unwrap()
        .movements
}

/// Bus that refuses every message.
#[derive(Debug, Default)]
pub struct FailingBus;

impl EventBus<InventoryEvent> for FailingBus {
    type Error = &'static str;

    fn publish(&self, _message: InventoryEvent) -> Result<(), Self::Error> {
        Err("bus is down")
    }

    fn subscribe(&self) -> Subscription<InventoryEvent> {
        let (_tx, rx) = mpsc::channel();
        Subscription::new(rx)
    }
}

/// In-memory store whose transactions can be told to fail a later
/// `append_movement` with a transient storage error.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    pub inner: InMemoryStockStore,
    budget: Arc<AtomicI64>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStockStore::new(),
            budget: Arc::new(AtomicI64::new(i64::MAX)),
        }
    }

    /// Let `successful` more appends through, then fail the next one.
    pub fn fail_after(&self, successful: i64) {
        self.budget.store(successful, Ordering::SeqCst);
    }
}

pub struct FlakyTx {
    inner: InMemoryTransaction,
    budget: Arc<AtomicI64>,
}

#[async_trait]
impl StockTransaction for FlakyTx {
    async fn lock_record(&mut self, key: &StockKey) -> Result<StockRecord, StorageError> {
        self.inner.lock_record(key).await
    }

    async fn lock_existing(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        self.inner.lock_existing(key).await
    }

    async fn save_record(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        self.inner.save_record(record).await
    }

    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StorageError> {
        if self.budget.fetch_sub(1, Ordering::SeqCst) == 0 {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        self.inner.append_movement(movement).await
    }

    async fn commit(self) -> Result<(), StorageError> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), StorageError> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl StockStore for FlakyStore {
    type Tx = FlakyTx;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        Ok(FlakyTx {
            inner: self.inner.begin().await?,
            budget: self.budget.clone(),
        })
    }

    async fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        self.inner.stock_record(key).await
    }

    async fn stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<StockRecord>, StorageError> {
        self.inner.stock_levels(location).await
    }

    async fn ledger_snapshot(
        &self,
        location: Option<&Location>,
    ) -> Result<LedgerSnapshot, StorageError> {
        self.inner.ledger_snapshot(location).await
    }

    async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StorageError> {
        self.inner.query_movements(filter, pagination).await
    }
}
