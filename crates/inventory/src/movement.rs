use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockkeep_core::{MovementId, ProductId, UserId, VariantId};

use crate::error::InventoryError;
use crate::key::{Location, StockKey};

/// Cause of a stock change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    Sale,
    Return,
    Damage,
    Adjustment,
    Transfer,
    Reservation,
    Release,
}

/// Which way a movement type moves stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    /// Sign is chosen by the caller.
    Either,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::Purchase,
        MovementType::Sale,
        MovementType::Return,
        MovementType::Damage,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Reservation,
        MovementType::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Damage => "damage",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MovementType::Purchase | MovementType::Return | MovementType::Release => {
                Direction::Inbound
            }
            MovementType::Sale | MovementType::Damage | MovementType::Reservation => {
                Direction::Outbound
            }
            MovementType::Adjustment | MovementType::Transfer => Direction::Either,
        }
    }

    /// Signed ledger quantity for a caller-supplied amount.
    ///
    /// Directional types use the magnitude and apply their own sign;
    /// adjustments and transfers keep the caller's sign.
    pub fn signed_quantity(&self, quantity: i64) -> Result<i64, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::invalid("quantity cannot be zero"));
        }
        let magnitude = quantity
            .checked_abs()
            .ok_or_else(|| InventoryError::invalid("quantity out of range"))?;
        Ok(match self.direction() {
            Direction::Inbound => magnitude,
            Direction::Outbound => -magnitude,
            Direction::Either => quantity,
        })
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InventoryError::UnknownMovementType(s.to_string()))
    }
}

/// Immutable ledger entry: one signed change to one stock record.
///
/// Movements are never updated or deleted. Mistakes are corrected by
/// recording a compensating movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    #[serde(flatten)]
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Positive = inbound, negative = outbound.
    pub quantity: i64,
    /// `None` for system-initiated movements.
    pub performed_by: Option<UserId>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    /// External order id, or the shared id of a transfer's two legs.
    pub transaction_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One requested change, as accepted by the mutation entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Caller amount; see [`MovementType::signed_quantity`].
    pub quantity: i64,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub transaction_reference: Option<String>,
}

impl StockChange {
    pub fn new(key: StockKey, movement_type: MovementType, quantity: i64) -> Self {
        Self {
            key,
            movement_type,
            quantity,
            notes: None,
            reason: None,
            transaction_reference: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.transaction_reference = Some(reference.into());
        self
    }

    /// Signed quantity this change will record.
    pub fn signed_quantity(&self) -> Result<i64, InventoryError> {
        self.movement_type.signed_quantity(self.quantity)
    }

    /// Input checks for a change submitted on its own or inside a batch.
    ///
    /// Transfer legs only exist in pairs, so `transfer` is refused here and
    /// must go through the transfer operation.
    pub fn validate_standalone(&self) -> Result<(), InventoryError> {
        if self.movement_type == MovementType::Transfer {
            return Err(InventoryError::invalid(
                "transfer movements are recorded through the transfer operation",
            ));
        }
        self.signed_quantity().map(|_| ())
    }

    /// Build the aggregate command for this change.
    pub fn to_command(
        &self,
        movement_id: MovementId,
        performed_by: Option<UserId>,
        occurred_at: DateTime<Utc>,
    ) -> Result<RecordMovement, InventoryError> {
        Ok(RecordMovement {
            movement_id,
            key: self.key.clone(),
            movement_type: self.movement_type,
            quantity: self.signed_quantity()?,
            performed_by,
            notes: clean(self.notes.as_deref()),
            reason: clean(self.reason.as_deref()),
            transaction_reference: clean(self.transaction_reference.as_deref()),
            occurred_at,
        })
    }
}

fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Loosely-typed change as it arrives from a form or JSON payload.
///
/// Converting it into a [`StockChange`] parses every field, so a batch is
/// fully typed before any transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawStockChange {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub location: String,
    pub quantity: i64,
    pub movement_type: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub transaction_reference: Option<String>,
}

impl TryFrom<RawStockChange> for StockChange {
    type Error = InventoryError;

    fn try_from(raw: RawStockChange) -> Result<Self, Self::Error> {
        let movement_type: MovementType = raw.movement_type.parse()?;
        let product_id: ProductId = raw.product_id.trim().parse()?;
        let variant_id = match raw.variant_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) => Some(v.parse::<VariantId>()?),
        };
        let location = Location::new(&raw.location)?;

        Ok(StockChange {
            key: StockKey::new(product_id, variant_id, location),
            movement_type,
            quantity: raw.quantity,
            notes: raw.notes,
            reason: raw.reason,
            transaction_reference: raw.transaction_reference,
        })
    }
}

/// Command: record one signed movement against a stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub key: StockKey,
    pub movement_type: MovementType,
    /// Already signed.
    pub quantity: i64,
    pub performed_by: Option<UserId>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub transaction_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
