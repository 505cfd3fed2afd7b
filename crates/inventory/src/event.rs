use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockkeep_core::UserId;
use stockkeep_events::Event;

use crate::key::StockKey;
use crate::movement::Movement;
use crate::record::StockRecord;

/// Committed change to a stock record, published after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryEvent {
    MovementRecorded {
        movement: Movement,
        quantity_available: i64,
        quantity_reserved: i64,
    },
    ReorderLevelChanged {
        key: StockKey,
        reorder_level: i64,
        changed_by: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    RecordRetired {
        key: StockKey,
        changed_by: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
    RecordReactivated {
        key: StockKey,
        changed_by: Option<UserId>,
        occurred_at: DateTime<Utc>,
    },
}

impl InventoryEvent {
    pub fn movement_recorded(movement: &Movement, after: &StockRecord) -> Self {
        Self::MovementRecorded {
            movement: movement.clone(),
            quantity_available: after.quantity_available,
            quantity_reserved: after.quantity_reserved,
        }
    }

    /// The stock record this event invalidates.
    pub fn key(&self) -> &StockKey {
        match self {
            InventoryEvent::MovementRecorded { movement, .. } => &movement.key,
            InventoryEvent::ReorderLevelChanged { key, .. }
            | InventoryEvent::RecordRetired { key, .. }
            | InventoryEvent::RecordReactivated { key, .. } => key,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::MovementRecorded { .. } => "inventory.stock.movement_recorded",
            InventoryEvent::ReorderLevelChanged { .. } => "inventory.stock.reorder_level_changed",
            InventoryEvent::RecordRetired { .. } => "inventory.stock.record_retired",
            InventoryEvent::RecordReactivated { .. } => "inventory.stock.record_reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::MovementRecorded { movement, .. } => movement.created_at,
            InventoryEvent::ReorderLevelChanged { occurred_at, .. }
            | InventoryEvent::RecordRetired { occurred_at, .. }
            | InventoryEvent::RecordReactivated { occurred_at, .. } => *occurred_at,
        }
    }
}
