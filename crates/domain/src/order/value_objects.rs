//! Value objects attached to an order.

use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, ProductId, VariantId};
use crate::money::Money;

/// A postal address. `region` keys the tax-rate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    /// State/region code (e.g., "CA"); used for the tax jurisdiction lookup.
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Returns true when the fields required for fulfillment and tax are
    /// present.
    pub fn is_complete(&self) -> bool {
        !self.line1.trim().is_empty()
            && !self.city.trim().is_empty()
            && !self.region.trim().is_empty()
            && !self.postal_code.trim().is_empty()
            && !self.country.trim().is_empty()
    }
}

/// Customer contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    pub email: String,
    pub name: String,
}

/// Shipping method chosen at checkout; keys the shipping-rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
        }
    }
}

impl std::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line on an order.
///
/// `unit_price` is the price snapshot taken at checkout; it is never
/// recomputed from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    /// Price per unit at the time of purchase.
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        product_id: impl Into<ProductId>,
        variant_id: Option<VariantId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total for this line (quantity × unit price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl Totals {
    /// Builds totals, deriving `total = subtotal + tax + shipping`.
    pub fn derive(subtotal: Money, tax: Money, shipping: Money) -> Self {
        Self {
            subtotal,
            tax,
            shipping,
            total: subtotal + tax + shipping,
        }
    }

    /// Returns true when the stored total matches its components.
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.tax + self.shipping
    }
}
