//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::CartServiceError;
use checkout::{CheckoutError, LifecycleError, ReconcileError};
use domain::{CartError, OrderError};
use inventory::InventoryError;
use store::StoreError;

/// API-level error type that maps onto HTTP responses.
///
/// Checkout-time errors surface structurally: an error kind plus the
/// offending product where there is one.
#[derive(Debug)]
pub enum ApiError {
    /// No resolved identity was supplied.
    Unauthorized(String),
    /// Resource not found.
    NotFound(String),
    /// Malformed or invalid input.
    Validation(String),
    /// Cart service error.
    Cart(CartServiceError),
    /// Checkout error.
    Checkout(CheckoutError),
    /// Webhook reconciliation error (transient; the processor retries).
    Reconcile(ReconcileError),
    /// Order lifecycle error.
    Lifecycle(LifecycleError),
    /// Inventory ledger error.
    Inventory(InventoryError),
    /// Internal server error.
    Internal(String),
}

/// (status, kind, message, offending product if any)
type ErrorParts = (StatusCode, &'static str, String, Option<String>);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, product_id) = self.into_parts();

        if status.is_server_error() {
            tracing::error!(kind, error = %message, "request failed");
        }

        let mut body = serde_json::json!({ "error": message, "kind": kind });
        if let Some(product_id) = product_id {
            body["product_id"] = serde_json::Value::String(product_id);
        }
        (status, axum::Json(body)).into_response()
    }
}

impl ApiError {
    fn into_parts(self) -> ErrorParts {
        match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg, None),
            ApiError::Cart(err) => cart_error_parts(err),
            ApiError::Checkout(err) => checkout_error_parts(err),
            ApiError::Reconcile(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "transient",
                err.to_string(),
                None,
            ),
            ApiError::Lifecycle(err) => lifecycle_error_parts(err),
            ApiError::Inventory(err) => inventory_error_parts(err),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg, None)
            }
        }
    }
}

fn cart_error_parts(err: CartServiceError) -> ErrorParts {
    match &err {
        CartServiceError::CartNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found", err.to_string(), None)
        }
        CartServiceError::Cart(cart_err) => match cart_err {
            CartError::LineNotFound { product_id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                err.to_string(),
                Some(product_id.to_string()),
            ),
            CartError::InvalidQuantity { .. } | CartError::QuantityExceedsLimit { .. } => {
                (StatusCode::BAD_REQUEST, "validation", err.to_string(), None)
            }
        },
        CartServiceError::Inventory(inv) => inventory_error_ref_parts(inv, err.to_string()),
        CartServiceError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
            None,
        ),
    }
}

fn checkout_error_parts(err: CheckoutError) -> ErrorParts {
    match &err {
        CheckoutError::EmptyCart => {
            (StatusCode::BAD_REQUEST, "empty_cart", err.to_string(), None)
        }
        CheckoutError::Validation(_) => {
            (StatusCode::BAD_REQUEST, "validation", err.to_string(), None)
        }
        CheckoutError::ProductUnavailable(product_id) => (
            StatusCode::CONFLICT,
            "product_unavailable",
            err.to_string(),
            Some(product_id.to_string()),
        ),
        CheckoutError::Inventory(inv) => inventory_error_ref_parts(inv, err.to_string()),
        CheckoutError::Order(_) => (StatusCode::CONFLICT, "conflict", err.to_string(), None),
        CheckoutError::Payment(_) => (
            StatusCode::BAD_GATEWAY,
            "payment_processing",
            err.to_string(),
            None,
        ),
        CheckoutError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
            None,
        ),
    }
}

fn lifecycle_error_parts(err: LifecycleError) -> ErrorParts {
    match &err {
        LifecycleError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found", err.to_string(), None)
        }
        LifecycleError::Order(OrderError::InvalidTransition { .. })
        | LifecycleError::UnsupportedStatus(_) => (
            StatusCode::CONFLICT,
            "invalid_transition",
            err.to_string(),
            None,
        ),
        LifecycleError::Order(_) => {
            (StatusCode::BAD_REQUEST, "validation", err.to_string(), None)
        }
        LifecycleError::Inventory(inv) => inventory_error_ref_parts(inv, err.to_string()),
        LifecycleError::Refund(_) => (
            StatusCode::BAD_GATEWAY,
            "payment_processing",
            err.to_string(),
            None,
        ),
        LifecycleError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            err.to_string(),
            None,
        ),
    }
}

fn inventory_error_parts(err: InventoryError) -> ErrorParts {
    let message = err.to_string();
    inventory_error_ref_parts(&err, message)
}

fn inventory_error_ref_parts(err: &InventoryError, message: String) -> ErrorParts {
    match err {
        InventoryError::Insufficient { product_id, .. } => (
            StatusCode::CONFLICT,
            "insufficient_inventory",
            message,
            Some(product_id.to_string()),
        ),
        InventoryError::ProductNotFound(product_id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            message,
            Some(product_id.to_string()),
        ),
        InventoryError::ReservationNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found", message, None)
        }
        InventoryError::AlreadyReleased { .. } => {
            (StatusCode::CONFLICT, "invalid_state", message, None)
        }
        InventoryError::Contention { product_id } => (
            StatusCode::CONFLICT,
            "concurrency_conflict",
            message,
            Some(product_id.to_string()),
        ),
        InventoryError::InvalidAdjustment { product_id, .. } => (
            StatusCode::CONFLICT,
            "invalid_adjustment",
            message,
            Some(product_id.to_string()),
        ),
        InventoryError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal", message, None)
        }
    }
}

impl From<CartServiceError> for ApiError {
    fn from(err: CartServiceError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        ApiError::Reconcile(err)
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
