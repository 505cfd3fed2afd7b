use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockkeep_core::{Aggregate, AggregateRoot};

use crate::error::InventoryError;
use crate::key::StockKey;
use crate::movement::{Movement, MovementType, RecordMovement};

/// Aggregate root: current stock state for one (product, variant, location).
///
/// `quantity_available` always equals the sum of the quantities of every
/// movement applied to the record, and `version` counts those movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub key: StockKey,
    pub quantity_available: i64,
    pub quantity_reserved: i64,
    /// Lifetime units sold; never decreases.
    pub quantity_sold: i64,
    pub reorder_level: i64,
    pub version: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// A record that has seen no movements yet.
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            quantity_available: 0,
            quantity_reserved: 0,
            quantity_sold: 0,
            reorder_level: 0,
            version: 0,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a record by applying `movements` in order.
    ///
    /// Movements for other keys are ignored.
    pub fn replay<'a>(
        key: StockKey,
        created_at: DateTime<Utc>,
        movements: impl IntoIterator<Item = &'a Movement>,
    ) -> Self {
        let mut record = Self::empty(key, created_at);
        for m in movements {
            if m.key == record.key {
                record.apply(m);
            }
        }
        record
    }

    /// Units physically held: sellable plus reserved.
    pub fn on_hand(&self) -> i64 {
        self.quantity_available + self.quantity_reserved
    }

    pub fn set_reorder_level(
        &mut self,
        level: i64,
        now: DateTime<Utc>,
    ) -> Result<(), InventoryError> {
        if level < 0 {
            return Err(InventoryError::invalid("reorder level cannot be negative"));
        }
        self.reorder_level = level;
        self.updated_at = now;
        Ok(())
    }

    /// Soft-retire the record. Only an empty record can be retired.
    pub fn retire(&mut self, now: DateTime<Utc>) -> Result<(), InventoryError> {
        if self.quantity_available != 0 || self.quantity_reserved != 0 {
            return Err(InventoryError::StockOnHand {
                available: self.quantity_available,
                reserved: self.quantity_reserved,
            });
        }
        self.active = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.active = true;
        self.updated_at = now;
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<Movement>, InventoryError> {
        if cmd.key != self.key {
            return Err(InventoryError::invalid("movement key does not match record"));
        }
        if !self.active {
            return Err(InventoryError::RecordRetired);
        }
        if cmd.quantity == 0 {
            return Err(InventoryError::invalid("quantity cannot be zero"));
        }

        // The command carries a signed quantity; it must agree with the type.
        let expected = cmd.movement_type.signed_quantity(cmd.quantity)?;
        if expected != cmd.quantity {
            return Err(InventoryError::invalid(format!(
                "{} movements cannot have quantity {}",
                cmd.movement_type, cmd.quantity
            )));
        }

        let requested = cmd.quantity.abs();
        let new_available = self
            .quantity_available
            .checked_add(cmd.quantity)
            .ok_or_else(|| InventoryError::invalid("quantity out of range"))?;
        if new_available < 0 {
            return Err(InventoryError::InsufficientStock {
                available: self.quantity_available,
                requested,
            });
        }

        match cmd.movement_type {
            MovementType::Release if requested > self.quantity_reserved => {
                return Err(InventoryError::InsufficientReserved {
                    reserved: self.quantity_reserved,
                    requested,
                });
            }
            MovementType::Reservation | MovementType::Sale => {
                let counter = if cmd.movement_type == MovementType::Sale {
                    self.quantity_sold
                } else {
                    self.quantity_reserved
                };
                if counter.checked_add(requested).is_none() {
                    return Err(InventoryError::invalid("quantity out of range"));
                }
            }
            _ => {}
        }

        Ok(vec![Movement {
            id: cmd.movement_id,
            key: cmd.key.clone(),
            movement_type: cmd.movement_type,
            quantity: cmd.quantity,
            performed_by: cmd.performed_by,
            notes: cmd.notes.clone(),
            reason: cmd.reason.clone(),
            transaction_reference: cmd.transaction_reference.clone(),
            created_at: cmd.occurred_at,
        }])
    }
}

impl AggregateRoot for StockRecord {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for StockRecord {
    type Command = RecordMovement;
    type Event = Movement;
    type Error = InventoryError;

    fn apply(&mut self, event: &Self::Event) {
        let magnitude = event.quantity.abs();
        self.quantity_available += event.quantity;
        match event.movement_type {
            MovementType::Sale => self.quantity_sold += magnitude,
            MovementType::Reservation => self.quantity_reserved += magnitude,
            MovementType::Release => self.quantity_reserved -= magnitude,
            _ => {}
        }
        self.updated_at = event.created_at;
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.handle_record(command)
    }
}
