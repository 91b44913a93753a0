//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use checkout::CheckoutRequest;
use domain::{Address, CustomerId, CustomerInfo, ShippingMethod};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{AppState, Stores};

use super::identity_from_headers;

// -- Request types --

#[derive(Deserialize)]
pub struct AddressRequest {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Deserialize)]
pub struct CustomerRequest {
    pub customer_id: Option<String>,
    pub email: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct InitiateCheckoutRequest {
    pub customer: CustomerRequest,
    pub shipping_address: AddressRequest,
    pub billing_address: AddressRequest,
    #[serde(default)]
    pub shipping_method: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub payment_session_ref: String,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

impl From<AddressRequest> for Address {
    fn from(req: AddressRequest) -> Self {
        Address {
            line1: req.line1,
            line2: req.line2,
            city: req.city,
            region: req.region,
            postal_code: req.postal_code,
            country: req.country,
        }
    }
}

/// Parses validated checkout input into the orchestrator's request type.
/// Validation failures never reach the core components.
fn validate(req: InitiateCheckoutRequest) -> Result<CheckoutRequest, ApiError> {
    if req.customer.email.trim().is_empty() || !req.customer.email.contains('@') {
        return Err(ApiError::Validation("invalid email address".to_string()));
    }
    if req.customer.name.trim().is_empty() {
        return Err(ApiError::Validation("customer name is required".to_string()));
    }

    let customer_id = match req.customer.customer_id {
        Some(ref raw) => Some(CustomerId::from_uuid(
            uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::Validation(format!("invalid customer id: {e}")))?,
        )),
        None => None,
    };

    let shipping_method = match req.shipping_method.as_deref() {
        None | Some("standard") => ShippingMethod::Standard,
        Some("express") => ShippingMethod::Express,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "unknown shipping method: {other}"
            )));
        }
    };

    Ok(CheckoutRequest {
        customer: CustomerInfo {
            customer_id,
            email: req.customer.email,
            name: req.customer.name,
        },
        shipping_address: req.shipping_address.into(),
        billing_address: req.billing_address.into(),
        shipping_method,
    })
}

// -- Handlers --

/// POST /checkout — validate the cart, reserve stock, open a payment
/// session.
#[tracing::instrument(skip(state, headers, req))]
pub async fn initiate<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<InitiateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let identity = identity_from_headers(&headers)?;
    let request = validate(req)?;

    let receipt = state.orchestrator.initiate(&identity, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: receipt.order_id.to_string(),
            payment_session_ref: receipt.payment_session_ref,
            subtotal_cents: receipt.totals.subtotal.cents(),
            tax_cents: receipt.totals.tax.cents(),
            shipping_cents: receipt.totals.shipping.cents(),
            total_cents: receipt.totals.total.cents(),
        }),
    ))
}
