//! Admin endpoints: order status updates and inventory adjustment.
//!
//! Thin wrappers over [`checkout::OrderLifecycle`] and
//! [`inventory::InventoryLedger`]; they inherit the core invariants and
//! error taxonomy.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{InventoryRecord, OrderStatus, ProductId};
use inventory::AdjustOperation;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::orders::OrderResponse;
use crate::{AppState, Stores};

use super::parse_order_id;

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

#[derive(Deserialize)]
pub struct AdjustInventoryRequest {
    pub operation: String,
    pub quantity: i64,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct InventoryResponse {
    pub product_id: String,
    pub total_stock: i64,
    pub reserved: i64,
    pub committed: i64,
    pub available: i64,
}

impl From<&InventoryRecord> for InventoryResponse {
    fn from(record: &InventoryRecord) -> Self {
        InventoryResponse {
            product_id: record.product_id.to_string(),
            total_stock: record.total_stock,
            reserved: record.reserved,
            committed: record.committed,
            available: record.available(),
        }
    }
}

// -- Handlers --

/// POST /admin/orders/{id}/status — drive an order to a new status.
#[tracing::instrument(skip(state, req))]
pub async fn update_order_status<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let target = OrderStatus::parse(&req.status)
        .ok_or_else(|| ApiError::Validation(format!("unknown order status: {}", req.status)))?;

    let order = state
        .lifecycle
        .update_status(order_id, target, req.tracking_number)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /admin/inventory — all inventory records.
#[tracing::instrument(skip(state))]
pub async fn list_inventory<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<InventoryResponse>>, ApiError> {
    let records = state.ledger.records().await?;
    Ok(Json(records.iter().map(InventoryResponse::from).collect()))
}

/// POST /admin/inventory/{product_id} — adjust stock.
#[tracing::instrument(skip(state, req))]
pub async fn adjust_inventory<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<AdjustInventoryRequest>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let operation = match req.operation.to_ascii_uppercase().as_str() {
        "SET" => AdjustOperation::Set,
        "ADD" => AdjustOperation::Add,
        "SUBTRACT" => AdjustOperation::Subtract,
        other => {
            return Err(ApiError::Validation(format!(
                "unknown adjustment operation: {other}"
            )));
        }
    };

    let record = state
        .ledger
        .adjust(
            &ProductId::new(product_id),
            operation,
            req.quantity,
            req.reason.as_deref(),
        )
        .await?;

    Ok(Json(InventoryResponse::from(&record)))
}
