//! HTTP route handlers.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod webhooks;

use axum::http::HeaderMap;
use common::OrderId;
use domain::{CartIdentity, CustomerId, SessionToken};

use crate::error::ApiError;

/// Header carrying an authenticated customer id (resolved upstream by the
/// identity provider).
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// Header carrying the opaque anonymous cart-session token.
pub const SESSION_HEADER: &str = "x-cart-session";

/// Resolves the caller's cart identity from the identity-provider headers.
///
/// The core never authenticates; it consumes an already-resolved identity.
pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<CartIdentity, ApiError> {
    if let Some(value) = headers.get(CUSTOMER_HEADER) {
        let raw = value
            .to_str()
            .map_err(|_| ApiError::Validation("invalid customer id header".to_string()))?;
        let uuid = uuid::Uuid::parse_str(raw)
            .map_err(|e| ApiError::Validation(format!("invalid customer id: {e}")))?;
        return Ok(CartIdentity::Customer(CustomerId::from_uuid(uuid)));
    }

    if let Some(value) = headers.get(SESSION_HEADER) {
        let raw = value
            .to_str()
            .map_err(|_| ApiError::Validation("invalid session token header".to_string()))?;
        if raw.trim().is_empty() {
            return Err(ApiError::Validation("empty session token".to_string()));
        }
        return Ok(CartIdentity::Guest(SessionToken::new(raw)));
    }

    Err(ApiError::Unauthorized(format!(
        "supply {CUSTOMER_HEADER} or {SESSION_HEADER}"
    )))
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::Validation(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
