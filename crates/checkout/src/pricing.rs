//! Tax and shipping rate lookups.
//!
//! Both are configuration, not contract: the numbers come from [`TaxTable`]
//! and [`ShippingRates`] instances built at startup, never from constants in
//! the checkout path.

use std::collections::HashMap;

use domain::{Money, ShippingMethod};

/// Jurisdiction tax rates in basis points, keyed by shipping region code,
/// with a default for regions without an explicit entry.
#[derive(Debug, Clone)]
pub struct TaxTable {
    default_bps: u32,
    rates: HashMap<String, u32>,
}

impl TaxTable {
    /// Creates a table that applies `default_bps` everywhere.
    pub fn with_default(default_bps: u32) -> Self {
        Self {
            default_bps,
            rates: HashMap::new(),
        }
    }

    /// Adds a per-region override.
    pub fn with_rate(mut self, region: impl Into<String>, bps: u32) -> Self {
        self.rates.insert(region.into(), bps);
        self
    }

    /// Returns the rate for a region in basis points.
    pub fn rate_for(&self, region: &str) -> u32 {
        self.rates.get(region).copied().unwrap_or(self.default_bps)
    }

    /// Computes the tax on a subtotal shipped to `region`.
    pub fn tax_on(&self, subtotal: Money, region: &str) -> Money {
        subtotal.apply_basis_points(self.rate_for(region))
    }
}

/// Shipping cost per method, with a free-shipping threshold on the
/// subtotal.
#[derive(Debug, Clone)]
pub struct ShippingRates {
    pub standard: Money,
    pub express: Money,
    /// Subtotals at or above this ship free (standard method only).
    pub free_shipping_threshold: Option<Money>,
}

impl ShippingRates {
    /// Returns the shipping cost for a method given the order subtotal.
    pub fn cost_for(&self, method: ShippingMethod, subtotal: Money) -> Money {
        match method {
            ShippingMethod::Standard => {
                if let Some(threshold) = self.free_shipping_threshold
                    && subtotal >= threshold
                {
                    return Money::zero();
                }
                self.standard
            }
            ShippingMethod::Express => self.express,
        }
    }
}
