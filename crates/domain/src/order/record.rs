//! The order record and its guarded lifecycle transitions.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Version};
use serde::{Deserialize, Serialize};

use super::state::OrderStatus;
use super::value_objects::{Address, CustomerInfo, OrderLine, ShippingMethod, Totals};
use super::OrderError;
use crate::cart::CartIdentity;

/// An order.
///
/// Lines and monetary totals are immutable after creation; only status,
/// tracking, restock bookkeeping and the lifecycle timestamps change. Every
/// transition is guarded by the [`OrderStatus`] predicates and fails with
/// [`OrderError::InvalidTransition`] otherwise, leaving the record
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Cart this order was checked out from; cleared on payment success.
    pub cart_identity: CartIdentity,
    pub customer: CustomerInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingMethod,
    lines: Vec<OrderLine>,
    totals: Totals,
    /// Reservations taken for this order at checkout.
    pub reservation_ids: Vec<ReservationId>,
    /// Payment session opened for this order, once known.
    pub payment_session_ref: Option<String>,
    pub tracking_number: Option<String>,
    /// Set when committed stock has been returned via cancellation/refund,
    /// so a later refund cannot restock twice.
    pub restocked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version; bumped by the store on every update.
    pub version: Version,
}

/// Everything needed to open an order at the end of checkout validation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub cart_identity: CartIdentity,
    pub customer: CustomerInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingMethod,
    pub lines: Vec<OrderLine>,
    pub totals: Totals,
    pub reservation_ids: Vec<ReservationId>,
}

impl Order {
    /// Opens a pending order.
    ///
    /// Rejects empty line lists, zero quantities, negative prices, and
    /// totals that do not add up.
    pub fn open(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() {
            return Err(OrderError::NoLines);
        }
        for line in &new.lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: line.quantity,
                });
            }
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    price: line.unit_price.cents(),
                });
            }
        }
        if !new.totals.is_consistent() {
            return Err(OrderError::TotalMismatch {
                expected: (new.totals.subtotal + new.totals.tax + new.totals.shipping).cents(),
                actual: new.totals.total.cents(),
            });
        }

        Ok(Self {
            id: new.id,
            status: OrderStatus::Pending,
            cart_identity: new.cart_identity,
            customer: new.customer,
            shipping_address: new.shipping_address,
            billing_address: new.billing_address,
            shipping_method: new.shipping_method,
            lines: new.lines,
            totals: new.totals,
            reservation_ids: new.reservation_ids,
            payment_session_ref: None,
            tracking_number: None,
            restocked_at: None,
            created_at: now,
            paid_at: None,
            cancelled_at: None,
            shipped_at: None,
            delivered_at: None,
            refunded_at: None,
            version: Version::initial(),
        })
    }

    /// Returns the order lines.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the monetary breakdown.
    pub fn totals(&self) -> Totals {
        self.totals
    }

    /// Records the payment session opened for this order.
    pub fn attach_payment_session(&mut self, session_ref: impl Into<String>) {
        self.payment_session_ref = Some(session_ref.into());
    }

    /// Payment success: `Pending → Processing`.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_mark_paid() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                action: "mark paid",
            });
        }
        self.status = OrderStatus::Processing;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Cancellation: `Pending → Cancelled` or `Processing → Cancelled`.
    ///
    /// The caller decides the compensating inventory action based on the
    /// status before this call (release for pending, restock for
    /// processing).
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                action: "cancel",
            });
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// Shipment: `Processing → Shipped`.
    pub fn ship(
        &mut self,
        tracking_number: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_ship() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                action: "ship",
            });
        }
        self.status = OrderStatus::Shipped;
        self.shipped_at = Some(now);
        if tracking_number.is_some() {
            self.tracking_number = tracking_number;
        }
        Ok(())
    }

    /// Delivery: `Shipped → Delivered`.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_deliver() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                action: "deliver",
            });
        }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Refund: `Delivered → Refunded` or `Cancelled → Refunded`.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_refund() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                action: "refund",
            });
        }
        self.status = OrderStatus::Refunded;
        self.refunded_at = Some(now);
        Ok(())
    }

    /// Marks committed stock as returned. Returns false if a previous
    /// cancellation/refund already restocked this order.
    pub fn mark_restocked(&mut self, now: DateTime<Utc>) -> bool {
        if self.restocked_at.is_some() {
            return false;
        }
        self.restocked_at = Some(now);
        true
    }

    /// Returns the total quantity across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}
