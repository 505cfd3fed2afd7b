//! Records vs. ledger reconciliation.
//!
//! A record is consistent when its `quantity_available` equals the sum of
//! its movement quantities and its `version` equals its movement count.
//! Inconsistencies are reported, never corrected here.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{Location, StockKey};
use crate::record::StockRecord;

/// Aggregated ledger rows for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub quantity: i64,
    pub movements: u64,
}

/// One key whose record disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationError {
    pub key: StockKey,
    /// `quantity_available` on the record (0 when the record is missing).
    pub recorded: i64,
    /// Sum of movement quantities.
    pub derived: i64,
    pub recorded_version: u64,
    pub movement_count: u64,
}

impl core::fmt::Display for ReconciliationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: recorded {} (v{}), ledger {} ({} movements)",
            self.key, self.recorded, self.recorded_version, self.derived, self.movement_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub location: Option<Location>,
    pub checked: usize,
    pub mismatches: Vec<ReconciliationError>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare records with ledger totals taken from the same snapshot.
///
/// Keys present only in the ledger are reported with `recorded = 0`.
/// Mismatches come out in key order.
pub fn reconcile(
    location: Option<Location>,
    records: &[StockRecord],
    totals: &HashMap<StockKey, LedgerTotals>,
    checked_at: DateTime<Utc>,
) -> ValidationReport {
    let mut keys: BTreeMap<&StockKey, (Option<&StockRecord>, LedgerTotals)> = BTreeMap::new();
    for r in records {
        keys.insert(&r.key, (Some(r), totals.get(&r.key).copied().unwrap_or_default()));
    }
    for (k, t) in totals {
        keys.entry(k).or_insert((None, *t));
    }

    let checked = keys.len();
    let mismatches = keys
        .into_iter()
        .filter_map(|(key, (record, ledger))| {
            let (recorded, version) = record
                .map(|r| (r.quantity_available, r.version))
                .unwrap_or((0, 0));
            if recorded == ledger.quantity && version == ledger.movements {
                return None;
            }
            Some(ReconciliationError {
                key: key.clone(),
                recorded,
                derived: ledger.quantity,
                recorded_version: version,
                movement_count: ledger.movements,
            })
        })
        .collect();

    ValidationReport {
        location,
        checked,
        mismatches,
        checked_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockkeep_core::ProductId;

    fn key(loc: &str) -> StockKey {
        StockKey::new(ProductId::new(), None, Location::new(loc).unwrap())
    }

    fn record(key: &StockKey, available: i64, version: u64) -> StockRecord {
        let mut r = StockRecord::empty(key.clone(), Utc::now());
        r.quantity_available = available;
        r.version = version;
        r
    }

    #[test]
    fn matching_records_are_consistent() {
        let k = key("main");
        let totals = HashMap::from([(k.clone(), LedgerTotals { quantity: 7, movements: 2 })]);
        let report = reconcile(None, &[record(&k, 7, 2)], &totals, Utc::now());
        assert!(report.is_consistent());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn quantity_drift_is_reported() {
        let k = key("main");
        let totals = HashMap::from([(k.clone(), LedgerTotals { quantity: 7, movements: 2 })]);
        let report = reconcile(None, &[record(&k, 9, 2)], &totals, Utc::now());
        assert_eq!(report.mismatches.len(), 1);
        let m = &report.mismatches[0];
        assert_eq!((m.recorded, m.derived), (9, 7));
    }

    #[test]
    fn version_drift_is_reported() {
        let k = key("main");
        let totals = HashMap::from([(k.clone(), LedgerTotals { quantity: 7, movements: 3 })]);
        let report = reconcile(None, &[record(&k, 7, 2)], &totals, Utc::now());
        assert_eq!(report.mismatches[0].movement_count, 3);
    }

    #[test]
    fn record_without_movements_must_be_empty() {
        let k = key("main");
        let report = reconcile(None, &[record(&k, 0, 0)], &HashMap::new(), Utc::now());
        assert!(report.is_consistent());

        let report = reconcile(None, &[record(&k, 3, 0)], &HashMap::new(), Utc::now());
        assert_eq!(report.mismatches[0].derived, 0);
    }

    #[test]
    fn orphan_ledger_keys_are_reported() {
        let k = key("main");
        let totals = HashMap::from([(k.clone(), LedgerTotals { quantity: 4, movements: 1 })]);
        let report = reconcile(None, &[], &totals, Utc::now());
        assert_eq!(report.checked, 1);
        assert_eq!(report.mismatches[0].recorded, 0);
        assert_eq!(report.mismatches[0].key, k);
    }
}
