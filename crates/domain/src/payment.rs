//! Payment-outcome events delivered by the external payment processor.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

/// Outcome reported by the payment processor for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    /// Payment captured; the order can proceed.
    Succeeded,
    /// Payment declined or errored.
    Failed,
    /// The payment session lapsed without completion.
    Expired,
}

impl PaymentOutcome {
    /// Returns the outcome name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Failed => "failed",
            PaymentOutcome::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored record of a received payment event.
///
/// `external_event_id` is the processor-assigned unique id used as the
/// idempotency key: delivery is at-least-once, effect must be at-most-once.
/// `processed` becomes true exactly once, after the reconciliation work for
/// the event has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEventRecord {
    /// Processor-assigned unique event id (idempotency key).
    pub external_event_id: String,
    /// Payment session the event refers to.
    pub session_ref: String,
    /// Reported outcome.
    pub outcome: PaymentOutcome,
    /// Order resolved from `session_ref`, if any was found.
    pub order_id: Option<OrderId>,
    /// When the event arrived at this system.
    pub received_at: DateTime<Utc>,
    /// Whether reconciliation side effects have been applied.
    pub processed: bool,
}

impl PaymentEventRecord {
    /// Creates an unprocessed record for a freshly received event.
    pub fn received(
        external_event_id: impl Into<String>,
        session_ref: impl Into<String>,
        outcome: PaymentOutcome,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_event_id: external_event_id.into(),
            session_ref: session_ref.into(),
            outcome,
            order_id: None,
            received_at,
            processed: false,
        }
    }
}
