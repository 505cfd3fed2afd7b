//! Transfers: two linked `transfer` movements sharing one reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockkeep_core::{ProductId, VariantId};

use crate::error::InventoryError;
use crate::key::{Location, StockKey};
use crate::movement::{Movement, MovementType, StockChange};

/// Fresh reference shared by both legs of a transfer.
pub fn new_transfer_reference() -> String {
    format!("TRF-{}", Uuid::now_v7())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    pub from: Location,
    pub to: Location,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

impl TransferRequest {
    pub fn new(
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: i64,
        from: Location,
        to: Location,
    ) -> Self {
        Self {
            product_id,
            variant_id,
            quantity,
            from,
            to,
            notes: None,
            reason: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.quantity <= 0 {
            return Err(InventoryError::invalid("transfer quantity must be positive"));
        }
        if self.from == self.to {
            return Err(InventoryError::invalid(
                "source and destination locations must differ",
            ));
        }
        Ok(())
    }

    pub fn source_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id, self.from.clone())
    }

    pub fn destination_key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id, self.to.clone())
    }

    /// The outbound and inbound legs, both tagged with `reference`.
    pub fn legs(&self, reference: &str) -> (StockChange, StockChange) {
        let leg = |key: StockKey, quantity: i64| StockChange {
            key,
            movement_type: MovementType::Transfer,
            quantity,
            notes: self.notes.clone(),
            reason: self.reason.clone(),
            transaction_reference: Some(reference.to_string()),
        };
        (
            leg(self.source_key(), -self.quantity),
            leg(self.destination_key(), self.quantity),
        )
    }
}

/// Query-time grouping of a transfer's two legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPair {
    pub reference: String,
    pub outbound: Movement,
    pub inbound: Movement,
}

impl TransferPair {
    /// Group ledger rows sharing `reference` into a pair.
    ///
    /// `None` unless the rows are exactly one negative and one positive
    /// `transfer` movement of equal magnitude for the same product/variant.
    pub fn from_movements(reference: &str, movements: &[Movement]) -> Option<Self> {
        let legs: Vec<&Movement> = movements
            .iter()
            .filter(|m| m.transaction_reference.as_deref() == Some(reference))
            .collect();
        if legs.len() != 2 || legs.iter().any(|m| m.movement_type != MovementType::Transfer) {
            return None;
        }

        let (out, inb) = if legs[0].quantity < 0 {
            (legs[0], legs[1])
        } else {
            (legs[1], legs[0])
        };
        let same_item = out.key.product_id == inb.key.product_id
            && out.key.variant_id == inb.key.variant_id;
        if out.quantity >= 0 || inb.quantity != -out.quantity || !same_item {
            return None;
        }

        Some(Self {
            reference: reference.to_string(),
            outbound: out.clone(),
            inbound: inb.clone(),
        })
    }

    pub fn quantity(&self) -> i64 {
        self.inbound.quantity
    }
}
