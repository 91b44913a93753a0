//! Domain model for the storefront core.
//!
//! Pure types and state machines, no I/O:
//! - [`Cart`] line bookkeeping and merge semantics
//! - [`InventoryRecord`] counters and [`Reservation`] holds
//! - [`Order`] with its guarded [`OrderStatus`] lifecycle
//! - [`PaymentEventRecord`] for idempotent webhook reconciliation

pub mod cart;
pub mod ids;
pub mod inventory;
pub mod money;
pub mod order;
pub mod payment;

pub use cart::{Cart, CartError, CartIdentity, LineKey, MAX_LINE_QUANTITY};
pub use ids::{CustomerId, ProductId, SessionToken, VariantId};
pub use inventory::{InventoryRecord, Reservation, ReservationStatus};
pub use money::Money;
pub use order::{
    Address, CustomerInfo, NewOrder, Order, OrderError, OrderLine, OrderStatus, ShippingMethod,
    Totals,
};
pub use payment::{PaymentEventRecord, PaymentOutcome};
