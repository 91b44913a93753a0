//! Order record, status machine and related value objects.

mod record;
mod state;
mod value_objects;

pub use record::{NewOrder, Order};
pub use state::OrderStatus;
pub use value_objects::{Address, CustomerInfo, OrderLine, ShippingMethod, Totals};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The requested transition is not allowed from the current status.
    #[error("Invalid transition: cannot {action} from {from} status")]
    InvalidTransition {
        from: OrderStatus,
        action: &'static str,
    },

    /// Order has no lines.
    #[error("Order has no lines")]
    NoLines,

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    /// Stored total does not equal subtotal + tax + shipping.
    #[error("Total mismatch: expected {expected} cents, got {actual}")]
    TotalMismatch { expected: i64, actual: i64 },
}
