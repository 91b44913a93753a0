//! Cart service for the storefront core.

mod error;
mod service;

pub use error::{CartServiceError, Result};
pub use service::CartService;
