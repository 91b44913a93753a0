//! Checkout, reconciliation and lifecycle error types.

use common::OrderId;
use domain::{OrderError, ProductId};
use inventory::InventoryError;
use store::StoreError;
use thiserror::Error;

use crate::services::ServiceError;

/// Errors surfaced synchronously by checkout initiation.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A line's product is archived, inactive, or unknown to the catalog.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// A checkout input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Inventory ledger failure; `Insufficient` names the failing product.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Order construction/transition failure.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The payment processor call failed.
    #[error("Payment processing failed: {0}")]
    Payment(ServiceError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by webhook reconciliation.
///
/// Only genuinely transient conditions surface as errors (so the
/// processor's retry mechanism redelivers); business anomalies are
/// acknowledged instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Inventory ledger failure while committing/releasing.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Store failure; retryable by redelivery.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by order lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No order exists with the given id.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested transition is not allowed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Compensating inventory action failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// The payment processor rejected the refund signal.
    #[error("Refund signal failed: {0}")]
    Refund(ServiceError),

    /// The requested target status cannot be set directly.
    #[error("Status {0} cannot be set via this operation")]
    UnsupportedStatus(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
