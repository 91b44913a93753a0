//! Inventory records and reservations.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Version};
use serde::{Deserialize, Serialize};

use crate::ids::ProductId;

/// Per-product stock counters.
///
/// Invariant: `available = total_stock - reserved - committed >= 0`, with
/// `reserved >= 0` and `committed >= 0` at all times. Committed units are
/// never subtracted from `total_stock`; they stay in the `committed` counter
/// so the availability formula holds without rewriting history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub total_stock: i64,
    pub reserved: i64,
    pub committed: i64,
    /// Optimistic-concurrency version; bumped by the store on every update.
    pub version: Version,
}

impl InventoryRecord {
    /// Creates a fresh record with the given stock and nothing held.
    pub fn new(product_id: impl Into<ProductId>, total_stock: i64) -> Self {
        Self {
            product_id: product_id.into(),
            total_stock,
            reserved: 0,
            committed: 0,
            version: Version::initial(),
        }
    }

    /// Units available to new reservations right now.
    pub fn available(&self) -> i64 {
        self.total_stock - self.reserved - self.committed
    }

    /// Moves `quantity` units from available to reserved.
    ///
    /// Returns false (leaving the record untouched) if availability is
    /// insufficient.
    pub fn try_reserve(&mut self, quantity: i64) -> bool {
        if quantity <= 0 || self.available() < quantity {
            return false;
        }
        self.reserved += quantity;
        true
    }

    /// Returns `quantity` reserved units to available stock.
    pub fn release(&mut self, quantity: i64) {
        self.reserved = (self.reserved - quantity).max(0);
    }

    /// Converts `quantity` reserved units into committed (sold) units.
    pub fn commit(&mut self, quantity: i64) {
        let moved = quantity.min(self.reserved).max(0);
        self.reserved -= moved;
        self.committed += moved;
    }

    /// Adds stock (restock on cancellation/refund, or supplier intake).
    pub fn restock(&mut self, quantity: i64) {
        self.total_stock += quantity;
    }

    /// True when the counters satisfy the availability invariant.
    pub fn invariant_holds(&self) -> bool {
        self.reserved >= 0 && self.committed >= 0 && self.available() >= 0
    }
}

/// Lifecycle of a reservation.
///
/// ```text
/// Active ──┬──► Committed   (payment success)
///          └──► Released    (failure, expiry, cancellation)
/// ```
///
/// A reservation leaves `Active` exactly once; both terminal states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Holding stock, waiting for the payment outcome.
    #[default]
    Active,
    /// Converted into sold stock (terminal).
    Committed,
    /// Quantity returned to available stock (terminal).
    Released,
}

impl ReservationStatus {
    /// Returns true once the reservation can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Committed | ReservationStatus::Released)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded hold on inventory created during checkout.
///
/// Owned by the order that created it; destroyed (terminally) on commit or
/// release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates an active reservation expiring at `expires_at`.
    pub fn new(
        id: ReservationId,
        order_id: OrderId,
        product_id: impl Into<ProductId>,
        quantity: i64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            product_id: product_id.into(),
            quantity,
            status: ReservationStatus::Active,
            created_at,
            expires_at,
        }
    }

    /// True when the reservation is still holding stock.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// True when the TTL has elapsed at `now` and the hold is still active.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }
}
