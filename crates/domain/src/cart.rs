//! Shopping cart model: per-identity line bookkeeping and merge semantics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{CustomerId, ProductId, SessionToken, VariantId};

/// Maximum quantity allowed per cart line.
pub const MAX_LINE_QUANTITY: u32 = 9999;

/// Errors that can occur during cart line bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// Quantity must be at least 1.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Quantity would exceed the per-line maximum.
    #[error("Quantity {quantity} exceeds the per-line maximum of {max}")]
    QuantityExceedsLimit { quantity: u32, max: u32 },

    /// The addressed line is not in the cart.
    #[error("Line not found: {product_id}")]
    LineNotFound { product_id: ProductId },
}

/// Identity owning a cart: an authenticated customer or an anonymous guest
/// session. Guest identities come from an opaque token issued by the
/// external identity collaborator; the core never reads transport-layer
/// storage itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CartIdentity {
    /// Authenticated customer.
    Customer(CustomerId),
    /// Anonymous guest session.
    Guest(SessionToken),
}

impl std::fmt::Display for CartIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartIdentity::Customer(id) => write!(f, "customer:{id}"),
            CartIdentity::Guest(token) => write!(f, "guest:{token}"),
        }
    }
}

/// Key addressing one cart line: a product plus an optional variant.
///
/// Ordered by product then variant so iteration (and therefore checkout
/// reservation order) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl LineKey {
    /// Creates a line key for a product with an optional variant.
    pub fn new(product_id: impl Into<ProductId>, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
        }
    }

    /// Creates a line key for a product with no variant.
    pub fn product(product_id: impl Into<ProductId>) -> Self {
        Self::new(product_id, None)
    }
}

/// A shopping cart: at most one line per (product, variant) pair, each with
/// a quantity of at least 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Identity owning this cart.
    pub identity: CartIdentity,
    /// Lines keyed by (product, variant), quantity per line.
    ///
    /// Serialized as a list of line records; JSON object keys must be
    /// strings.
    #[serde(with = "line_map")]
    lines: BTreeMap<LineKey, u32>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

mod line_map {
    use super::{BTreeMap, LineKey};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Line {
        #[serde(flatten)]
        key: LineKey,
        quantity: u32,
    }

    pub fn serialize<S: Serializer>(
        lines: &BTreeMap<LineKey, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(lines.len()))?;
        for (key, quantity) in lines {
            seq.serialize_element(&Line {
                key: key.clone(),
                quantity: *quantity,
            })?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<LineKey, u32>, D::Error> {
        let lines = Vec::<Line>::deserialize(deserializer)?;
        Ok(lines.into_iter().map(|l| (l.key, l.quantity)).collect())
    }
}

impl Cart {
    /// Creates an empty cart for the given identity.
    pub fn new(identity: CartIdentity) -> Self {
        Self {
            identity,
            lines: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Adds quantity to a line, creating it if absent.
    pub fn add_item(&mut self, key: LineKey, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let current = self.lines.get(&key).copied().unwrap_or(0);
        let new_quantity = current.saturating_add(quantity);
        if new_quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityExceedsLimit {
                quantity: new_quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        self.lines.insert(key, new_quantity);
        self.touch();
        Ok(())
    }

    /// Sets the quantity of an existing line.
    pub fn update_item(&mut self, key: &LineKey, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityExceedsLimit {
                quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        match self.lines.get_mut(key) {
            Some(q) => {
                *q = quantity;
                self.touch();
                Ok(())
            }
            None => Err(CartError::LineNotFound {
                product_id: key.product_id.clone(),
            }),
        }
    }

    /// Removes a line from the cart.
    pub fn remove_item(&mut self, key: &LineKey) -> Result<(), CartError> {
        if self.lines.remove(key).is_none() {
            return Err(CartError::LineNotFound {
                product_id: key.product_id.clone(),
            });
        }
        self.touch();
        Ok(())
    }

    /// Empties all lines.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.touch();
    }

    /// Sums another cart's quantities into this one, per line, capped at the
    /// per-line maximum. Availability clamping is the caller's concern.
    pub fn merge_from(&mut self, other: &Cart) {
        for (key, qty) in &other.lines {
            let current = self.lines.get(key).copied().unwrap_or(0);
            let merged = current.saturating_add(*qty).min(MAX_LINE_QUANTITY);
            self.lines.insert(key.clone(), merged);
        }
        self.touch();
    }

    /// Clamps a line's quantity to `max`, dropping the line if `max` is 0.
    ///
    /// Keeps the quantity ≥ 1 invariant: a line clamped to nothing is no
    /// longer a line.
    pub fn clamp_line(&mut self, key: &LineKey, max: u32) {
        if max == 0 {
            self.lines.remove(key);
            self.touch();
            return;
        }
        if let Some(q) = self.lines.get_mut(key)
            && *q > max
        {
            *q = max;
            self.touch();
        }
    }

    /// Returns the quantity for a line, if present.
    pub fn quantity(&self, key: &LineKey) -> Option<u32> {
        self.lines.get(key).copied()
    }

    /// Iterates over lines in deterministic (product, variant) order.
    pub fn lines(&self) -> impl Iterator<Item = (&LineKey, u32)> {
        self.lines.iter().map(|(k, q)| (k, *q))
    }

    /// Returns the number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the sum of all line quantities.
    pub fn total_quantity(&self) -> u32 {
        self.lines.values().sum()
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
