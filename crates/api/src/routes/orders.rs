//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use domain::Order;
use serde::Serialize;

use crate::error::ApiError;
use crate::{AppState, Stores};

use super::parse_order_id;

// -- Response types --

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let totals = order.totals();
        OrderResponse {
            id: order.id.to_string(),
            status: order.status.to_string(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    variant_id: line.variant_id.as_ref().map(|v| v.to_string()),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                })
                .collect(),
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            shipping_cents: totals.shipping.cents(),
            total_cents: totals.total.cents(),
            tracking_number: order.tracking_number.clone(),
            created_at: order.created_at,
            paid_at: order.paid_at,
            cancelled_at: order.cancelled_at,
            shipped_at: order.shipped_at,
            delivered_at: order.delivered_at,
            refunded_at: order.refunded_at,
        }
    }
}

// -- Handlers --

/// GET /orders/{id} — load an order.
#[tracing::instrument(skip(state))]
pub async fn get<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .lifecycle
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel — explicit customer cancellation.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.lifecycle.cancel(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
