use serde::{Deserialize, Serialize};

use stockkeep_core::{ProductId, VariantId};

use crate::error::InventoryError;

/// Named stock location (store, warehouse, back room).
///
/// Always trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    pub fn new(name: impl AsRef<str>) -> Result<Self, InventoryError> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InventoryError::invalid("location cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Location {
    type Error = InventoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.0
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one stock record: product, optional variant, location.
///
/// The derived ordering is the canonical lock order used when several
/// records are locked in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub location: Location,
}

impl StockKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>, location: Location) -> Self {
        Self {
            product_id,
            variant_id,
            location,
        }
    }

    /// Same product/variant at another location.
    pub fn at(&self, location: Location) -> Self {
        Self {
            product_id: self.product_id,
            variant_id: self.variant_id,
            location,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.variant_id {
            Some(v) => write!(f, "{}/{}@{}", self.product_id, v, self.location),
            None => write!(f, "{}@{}", self.product_id, self.location),
        }
    }
}
