//! Batch change helpers.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::key::StockKey;
use crate::movement::StockChange;

/// How a batch reacts to a failing item.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkMode {
    /// One transaction; any failure rolls the whole batch back.
    #[default]
    Strict,
    /// Each item commits on its own; failures are reported inline.
    BestEffort,
}

impl FromStr for BulkMode {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(BulkMode::Strict),
            "best_effort" => Ok(BulkMode::BestEffort),
            other => Err(InventoryError::invalid(format!("unknown bulk mode: {other}"))),
        }
    }
}

/// Reject empty batches and batches above `max_items`.
pub fn check_batch_size(len: usize, max_items: usize) -> Result<(), InventoryError> {
    if len == 0 {
        return Err(InventoryError::invalid("batch is empty"));
    }
    if len > max_items {
        return Err(InventoryError::invalid(format!(
            "batch has {len} items, limit is {max_items}"
        )));
    }
    Ok(())
}

/// Check every item of a batch before any transaction opens.
///
/// Item failures carry the index of the first offending item; size
/// failures carry no index.
pub fn validate_batch(
    changes: &[StockChange],
    max_items: usize,
) -> Result<(), (Option<usize>, InventoryError)> {
    check_batch_size(changes.len(), max_items).map_err(|e| (None, e))?;
    for (idx, c) in changes.iter().enumerate() {
        c.validate_standalone().map_err(|e| (Some(idx), e))?;
    }
    Ok(())
}

/// Distinct keys touched by a batch, in canonical lock order.
pub fn lock_order<'a>(changes: impl IntoIterator<Item = &'a StockChange>) -> Vec<StockKey> {
    let mut keys: Vec<StockKey> = changes.into_iter().map(|c| c.key.clone()).collect();
    keys.sort();
    keys.dedup();
    keys
}
