use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockkeep_core::MovementId;
use stockkeep_inventory::{LedgerTotals, Location, Movement, StockKey, StockRecord};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::{LedgerSnapshot, StockStore, StockTransaction, StorageError};

#[derive(Debug, Default)]
struct LedgerState {
    records: BTreeMap<StockKey, StockRecord>,
    movements: Vec<Movement>,
    movement_ids: HashSet<MovementId>,
}

/// In-memory stock store.
///
/// Intended for tests/dev. Writers are serialized by a single gate held for
/// the lifetime of a transaction; readers only see committed state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<RwLock<LedgerState>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total ledger rows, across all keys.
    pub fn movement_count(&self) -> Result<usize, StorageError> {
        self.read(|s| s.movements.len())
    }

    /// Overwrite a record outside any transaction, bypassing the ledger.
    ///
    /// Only useful for simulating drift in reconciliation tests.
    pub fn force_record(&self, record: StockRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        state.records.insert(record.key.clone(), record);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> Result<T, StorageError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(f(&state))
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("lock poisoned".to_string())
}

fn at_location<'a>(
    location: Option<&'a Location>,
) -> impl Fn(&&StockKey) -> bool + 'a {
    move |k| location.is_none_or(|l| &k.location == l)
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StorageError> {
        let gate = self.writer.clone().lock_owned().await;
        Ok(InMemoryTransaction {
            state: self.state.clone(),
            _gate: gate,
            records: HashMap::new(),
            movements: Vec::new(),
        })
    }

    async fn stock_record(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        self.read(|s| s.records.get(key).cloned())
    }

    async fn stock_levels(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<StockRecord>, StorageError> {
        let keep = at_location(location);
        self.read(|s| {
            s.records
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(_, r)| r.clone())
                .collect()
        })
    }

    async fn ledger_snapshot(
        &self,
        location: Option<&Location>,
    ) -> Result<LedgerSnapshot, StorageError> {
        let keep = at_location(location);
        self.read(|s| {
            let records = s
                .records
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(_, r)| r.clone())
                .collect();

            let mut totals: HashMap<StockKey, LedgerTotals> = HashMap::new();
            for m in s.movements.iter().filter(|m| keep(&&m.key)) {
                let t = totals.entry(m.key.clone()).or_default();
                t.quantity += m.quantity;
                t.movements += 1;
            }
            LedgerSnapshot { records, totals }
        })
    }

    async fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StorageError> {
        let mut matching: Vec<Movement> = self.read(|s| {
            s.movements
                .iter()
                .filter(|m| filter.matches(m))
                .cloned()
                .collect()
        })?;

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        Ok(MovementPage::new(page, total, pagination))
    }
}

/// Staged writes plus the writer gate.
///
/// Nothing reaches the shared state until `commit`; dropping the
/// transaction discards the staged writes and releases the gate.
#[derive(Debug)]
pub struct InMemoryTransaction {
    state: Arc<RwLock<LedgerState>>,
    _gate: OwnedMutexGuard<()>,
    records: HashMap<StockKey, StockRecord>,
    movements: Vec<Movement>,
}

impl InMemoryTransaction {
    fn committed(&self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.records.get(key).cloned())
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn lock_record(&mut self, key: &StockKey) -> Result<StockRecord, StorageError> {
        if let Some(r) = self.lock_existing(key).await? {
            return Ok(r);
        }
        let record = StockRecord::empty(key.clone(), Utc::now());
        self.records.insert(key.clone(), record.clone());
        Ok(record)
    }

    async fn lock_existing(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        if let Some(r) = self.records.get(key) {
            return Ok(Some(r.clone()));
        }
        self.committed(key)
    }

    async fn save_record(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: &Movement) -> Result<(), StorageError> {
        if self.movements.iter().any(|m| m.id == movement.id) {
            return Err(StorageError::Conflict(format!(
                "duplicate movement id {}",
                movement.id
            )));
        }
        self.movements.push(movement.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if let Some(dup) = self
            .movements
            .iter()
            .find(|m| state.movement_ids.contains(&m.id))
        {
            return Err(StorageError::Conflict(format!(
                "duplicate movement id {}",
                dup.id
            )));
        }
        for (k, r) in self.records {
            state.records.insert(k, r);
        }
        state.movement_ids.extend(self.movements.iter().map(|m| m.id));
        state.movements.extend(self.movements);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StorageError> {
        Ok(())
    }
}
