//! Low-stock classification.
//!
//! Read-only analysis over stock records. The banding works on the stock
//! percentage `available / (reorder_level × multiplier) × 100`:
//!
//! | condition              | severity       |
//! |------------------------|----------------|
//! | available ≤ 0          | `out_of_stock` |
//! | 0 < pct ≤ 25           | `critical`     |
//! | 25 < pct ≤ 50          | `warning`      |
//! | pct > 50               | no alert       |
//!
//! A zero threshold means "no threshold": such records only alert when out
//! of stock.

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;
use crate::record::StockRecord;

const CRITICAL_PERCENT: f64 = 25.0;
const WARNING_PERCENT: f64 = 50.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    OutOfStock,
    Critical,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::OutOfStock => "out_of_stock",
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }

    pub fn suggested_action(&self) -> &'static str {
        match self {
            Severity::OutOfStock => "Restock immediately: item cannot be sold",
            Severity::Critical => "Reorder immediately",
            Severity::Warning => "Monitor and plan reorder",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub stock_record: StockRecord,
    pub severity: Severity,
    pub stock_percentage: f64,
    pub suggested_action: String,
}

/// Threshold multipliers must be finite and positive.
pub fn validate_multiplier(multiplier: f64) -> Result<(), InventoryError> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(())
    } else {
        Err(InventoryError::invalid(
            "threshold multiplier must be a finite positive number",
        ))
    }
}

/// Classify one record. `None` means the record is healthy.
pub fn classify(record: &StockRecord, multiplier: f64) -> Option<Alert> {
    let threshold = record.reorder_level as f64 * multiplier;
    let available = record.quantity_available;

    let (severity, percentage) = if available <= 0 {
        (Severity::OutOfStock, 0.0)
    } else {
        if threshold <= 0.0 {
            return None;
        }
        // Multiply before dividing so integral boundaries stay exact.
        let pct = (available as f64 * 100.0) / threshold;
        if pct <= CRITICAL_PERCENT {
            (Severity::Critical, pct)
        } else if pct <= WARNING_PERCENT {
            (Severity::Warning, pct)
        } else {
            return None;
        }
    };

    Some(Alert {
        stock_record: record.clone(),
        severity,
        stock_percentage: percentage,
        suggested_action: severity.suggested_action().to_string(),
    })
}

/// Alerts for all active records, most urgent first.
pub fn detect_low_stock<'a>(
    records: impl IntoIterator<Item = &'a StockRecord>,
    multiplier: f64,
) -> Result<Vec<Alert>, InventoryError> {
    validate_multiplier(multiplier)?;

    let mut alerts: Vec<Alert> = records
        .into_iter()
        .filter(|r| r.active)
        .filter_map(|r| classify(r, multiplier))
        .collect();

    alerts.sort_by(|a, b| {
        a.stock_percentage
            .total_cmp(&b.stock_percentage)
            .then_with(|| a.stock_record.key.cmp(&b.stock_record.key))
    });
    Ok(alerts)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub out_of_stock: usize,
    pub critical: usize,
    pub warning: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.out_of_stock + self.critical + self.warning
    }

    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::OutOfStock => self.out_of_stock += 1,
            Severity::Critical => self.critical += 1,
            Severity::Warning => self.warning += 1,
        }
    }
}

/// Dashboard summary over a set of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub counts: SeverityCounts,
    /// Active records examined.
    pub total_records: usize,
    pub healthy: usize,
    /// The most urgent alerts, bounded by the requested limit.
    pub priority_items: Vec<Alert>,
}

impl Dashboard {
    pub fn build<'a>(
        records: impl IntoIterator<Item = &'a StockRecord>,
        multiplier: f64,
        priority_limit: usize,
    ) -> Result<Self, InventoryError> {
        let active: Vec<&StockRecord> = records.into_iter().filter(|r| r.active).collect();
        let alerts = detect_low_stock(active.iter().copied(), multiplier)?;

        let mut counts = SeverityCounts::default();
        for a in &alerts {
            counts.bump(a.severity);
        }

        Ok(Self {
            counts,
            total_records: active.len(),
            healthy: active.len() - counts.total(),
            priority_items: alerts.into_iter().take(priority_limit).collect(),
        })
    }
}
