//! Payment processor trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, OrderLine, Totals};

use super::ServiceError;

/// A payment session opened with the external processor.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    /// Processor-assigned session reference; stored on the order and used
    /// to resolve webhook events back to it.
    pub session_ref: String,
}

/// Wire boundary to the external payment processor.
///
/// `create_session` is called after checkout has reserved stock; the
/// asynchronous outcome arrives later as a webhook event. `refund` signals
/// the processor to return money for a refunded order.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Opens a payment session for an order's totals.
    async fn create_session(
        &self,
        order_id: OrderId,
        line_items: &[OrderLine],
        totals: Totals,
        success_ref: &str,
        cancel_ref: &str,
    ) -> Result<PaymentSession, ServiceError>;

    /// Requests a refund of `amount` against a completed session.
    async fn refund(&self, session_ref: &str, amount: Money) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    sessions: HashMap<String, (OrderId, Money)>,
    refunds: Vec<(String, Money)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
}

/// In-memory payment processor for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProcessor {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentProcessor {
    /// Creates a new in-memory payment processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the processor to fail session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the processor to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of sessions opened.
    pub fn session_count(&self) -> usize {
        self.state.read().unwrap().sessions.len()
    }

    /// Returns the refunds requested so far.
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.state.read().unwrap().refunds.clone()
    }

    /// Returns the order and amount behind a session reference.
    pub fn session(&self, session_ref: &str) -> Option<(OrderId, Money)> {
        self.state.read().unwrap().sessions.get(session_ref).copied()
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn create_session(
        &self,
        order_id: OrderId,
        _line_items: &[OrderLine],
        totals: Totals,
        _success_ref: &str,
        _cancel_ref: &str,
    ) -> Result<PaymentSession, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(ServiceError::new("payment processor unavailable"));
        }

        state.next_id += 1;
        let session_ref = format!("PSESS-{:04}", state.next_id);
        state
            .sessions
            .insert(session_ref.clone(), (order_id, totals.total));

        Ok(PaymentSession { session_ref })
    }

    async fn refund(&self, session_ref: &str, amount: Money) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(ServiceError::new("refund rejected"));
        }

        state.refunds.push((session_ref.to_string(), amount));
        Ok(())
    }
}
