//! Inventory reservation ledger for the storefront core.
//!
//! [`InventoryLedger`] is the single authority over per-product stock: it
//! answers "can N units be taken right now" and owns every reservation's
//! lifecycle. [`ReservationSweeper`] is the background task that returns
//! expired holds to available stock.

mod error;
mod ledger;
mod sweep;

pub use error::{InventoryError, Result};
pub use ledger::{AdjustOperation, InventoryLedger};
pub use sweep::ReservationSweeper;
