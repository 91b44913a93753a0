//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use domain::{Cart, CustomerId, LineKey, VariantId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{AppState, Stores};

use super::{SESSION_HEADER, identity_from_headers};

// -- Request types --

#[derive(Deserialize)]
pub struct CartLineRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CartLineKeyRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub customer_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub identity: String,
    pub lines: Vec<CartLineResponse>,
    pub total_quantity: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        CartResponse {
            identity: cart.identity.to_string(),
            lines: cart
                .lines()
                .map(|(key, quantity)| CartLineResponse {
                    product_id: key.product_id.to_string(),
                    variant_id: key.variant_id.as_ref().map(|v| v.to_string()),
                    quantity,
                })
                .collect(),
            total_quantity: cart.total_quantity(),
            updated_at: cart.updated_at,
        }
    }
}

fn line_key(product_id: &str, variant_id: Option<&String>) -> LineKey {
    LineKey::new(product_id, variant_id.map(|v| VariantId::new(v.as_str())))
}

// -- Handlers --

/// GET /cart — the caller's cart (empty if none exists yet).
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let cart = state.cart_service.get_or_empty(&identity).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/items — add quantity to a line.
#[tracing::instrument(skip(state, headers, req))]
pub async fn add_item<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CartLineRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let key = line_key(&req.product_id, req.variant_id.as_ref());
    let cart = state
        .cart_service
        .add_item(&identity, key, req.quantity)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PUT /cart/items — set a line's quantity.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_item<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CartLineRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let key = line_key(&req.product_id, req.variant_id.as_ref());
    let cart = state
        .cart_service
        .update_item(&identity, &key, req.quantity)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart/items — remove a line.
#[tracing::instrument(skip(state, headers, req))]
pub async fn remove_item<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CartLineKeyRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let key = line_key(&req.product_id, req.variant_id.as_ref());
    let cart = state.cart_service.remove_item(&identity, &key).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /cart — destroy the cart.
#[tracing::instrument(skip(state, headers))]
pub async fn clear<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<axum::http::StatusCode, ApiError> {
    let identity = identity_from_headers(&headers)?;
    state.cart_service.clear(&identity).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// POST /cart/merge — merge the caller's guest cart into a customer cart
/// at sign-in.
#[tracing::instrument(skip(state, headers, req))]
pub async fn merge<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<MergeRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized(format!("merge requires the {SESSION_HEADER} header"))
        })?;

    let uuid = uuid::Uuid::parse_str(&req.customer_id)
        .map_err(|e| ApiError::Validation(format!("invalid customer id: {e}")))?;

    let cart = state
        .cart_service
        .merge_guest_cart(
            &domain::SessionToken::new(token),
            CustomerId::from_uuid(uuid),
        )
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}
