//! Ledger query types for audit-trail display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockkeep_core::{ProductId, UserId, VariantId};
use stockkeep_inventory::{Location, Movement, MovementType};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Missing values fall back to the defaults; `limit` is capped at 1000.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Ledger filter. Every set field must match; bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub variant_id: Option<VariantId>,
    pub location: Option<Location>,
    pub movement_type: Option<MovementType>,
    pub performed_by: Option<UserId>,
    pub transaction_reference: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_reference(reference: impl Into<String>) -> Self {
        Self {
            transaction_reference: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, m: &Movement) -> bool {
        self.product_id.is_none_or(|p| m.key.product_id == p)
            && self.variant_id.is_none_or(|v| m.key.variant_id == Some(v))
            && self.location.as_ref().is_none_or(|l| &m.key.location == l)
            && self.movement_type.is_none_or(|t| m.movement_type == t)
            && self.performed_by.is_none_or(|u| m.performed_by == Some(u))
            && self
                .transaction_reference
                .as_deref()
                .is_none_or(|r| m.transaction_reference.as_deref() == Some(r))
            && self.created_after.is_none_or(|t| m.created_at >= t)
            && self.created_before.is_none_or(|t| m.created_at <= t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub movements: Vec<Movement>,
    /// Matching rows across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(movements: Vec<Movement>, total: u64, pagination: Pagination) -> Self {
        let has_more = total > u64::from(pagination.offset) + u64::from(pagination.limit);
        Self {
            movements,
            total,
            pagination,
            has_more,
        }
    }
}
