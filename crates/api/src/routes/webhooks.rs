//! Payment-processor webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use checkout::WebhookEvent;
use domain::PaymentOutcome;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::{AppState, Stores};

/// Header carrying the processor's payload signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Deserialize)]
pub struct WebhookPayload {
    /// Processor-assigned unique event id (the idempotency key).
    pub event_id: String,
    pub session_ref: String,
    pub outcome: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// POST /webhooks/payment — consume a payment-outcome event.
///
/// The signature is checked before anything else; unsigned payloads never
/// reach the reconciler. Business anomalies are acknowledged with 200 so
/// the processor stops redelivering; only transient failures return 5xx.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn payment<S: Stores>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature != state.config.webhook_secret {
        return Err(ApiError::Unauthorized(
            "webhook signature verification failed".to_string(),
        ));
    }

    if payload.event_id.trim().is_empty() {
        return Err(ApiError::Validation("event_id is required".to_string()));
    }

    let outcome = match payload.outcome.as_str() {
        "succeeded" => PaymentOutcome::Succeeded,
        "failed" => PaymentOutcome::Failed,
        "expired" => PaymentOutcome::Expired,
        other => {
            return Err(ApiError::Validation(format!(
                "unknown payment outcome: {other}"
            )));
        }
    };

    let ack = state
        .reconciler
        .handle_event(WebhookEvent {
            external_event_id: payload.event_id,
            session_ref: payload.session_ref,
            outcome,
        })
        .await?;

    Ok(Json(WebhookResponse {
        status: ack.as_str(),
    }))
}
