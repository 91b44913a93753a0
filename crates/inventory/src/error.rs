//! Inventory ledger error types.

use common::ReservationId;
use domain::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during inventory ledger operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock to satisfy a reservation.
    #[error("Insufficient inventory for {product_id}: requested {requested}, available {available}")]
    Insufficient {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// No inventory record exists for the product.
    #[error("Product not found in inventory: {0}")]
    ProductNotFound(ProductId),

    /// No reservation exists with the given id.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Commit requested for a reservation that was already released.
    #[error("Reservation {reservation_id} was already released")]
    AlreadyReleased { reservation_id: ReservationId },

    /// The per-product compare-and-swap lost too many races in a row.
    /// Retryable by the caller.
    #[error("Concurrent modification of {product_id} exhausted retries")]
    Contention { product_id: ProductId },

    /// An admin adjustment would violate the availability invariant.
    #[error("Invalid adjustment for {product_id}: {detail}")]
    InvalidAdjustment {
        product_id: ProductId,
        detail: String,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
