//! Cart service error types.

use domain::{CartError, CartIdentity};
use inventory::InventoryError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during cart service operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    /// No cart exists for the identity.
    #[error("Cart not found for {0}")]
    CartNotFound(CartIdentity),

    /// Line bookkeeping rejected the request.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Availability lookup failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for cart service operations.
pub type Result<T> = std::result::Result<T, CartServiceError>;
