//! Notification service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::ProductId;

use super::ServiceError;

/// Outbound notifications. Always fire-and-forget from the core's point of
/// view: a failure is logged by the caller, never fatal to the transition
/// that triggered it.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Sends an order confirmation to the customer.
    async fn send_order_confirmation(
        &self,
        order_id: OrderId,
        email: &str,
    ) -> Result<(), ServiceError>;

    /// Alerts operations that a product's availability is low.
    async fn send_low_stock_alert(
        &self,
        product_id: &ProductId,
        current_stock: i64,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    confirmations: Vec<(OrderId, String)>,
    low_stock_alerts: Vec<(ProductId, i64)>,
    fail: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every call.
    pub fn set_fail(&self, fail: bool) {
        self.state.write().unwrap().fail = fail;
    }

    /// Returns order confirmations sent so far.
    pub fn confirmations(&self) -> Vec<(OrderId, String)> {
        self.state.read().unwrap().confirmations.clone()
    }

    /// Returns low-stock alerts sent so far.
    pub fn low_stock_alerts(&self) -> Vec<(ProductId, i64)> {
        self.state.read().unwrap().low_stock_alerts.clone()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_order_confirmation(
        &self,
        order_id: OrderId,
        email: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(ServiceError::new("notification gateway down"));
        }
        state.confirmations.push((order_id, email.to_string()));
        Ok(())
    }

    async fn send_low_stock_alert(
        &self,
        product_id: &ProductId,
        current_stock: i64,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if state.fail {
            return Err(ServiceError::new("notification gateway down"));
        }
        state
            .low_stock_alerts
            .push((product_id.clone(), current_stock));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirmation_is_recorded() {
        let service = InMemoryNotificationService::new();
        let order_id = OrderId::new();

        service
            .send_order_confirmation(order_id, "shopper@example.com")
            .await
            .unwrap();

        let sent = service.confirmations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, order_id);
    }

    #[tokio::test]
    async fn low_stock_alert_is_recorded() {
        let service = InMemoryNotificationService::new();
        service
            .send_low_stock_alert(&ProductId::new("SKU-001"), 2)
            .await
            .unwrap();

        assert_eq!(service.low_stock_alerts().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let service = InMemoryNotificationService::new();
        service.set_fail(true);

        let result = service
            .send_order_confirmation(OrderId::new(), "shopper@example.com")
            .await;
        assert!(result.is_err());
        assert!(service.confirmations().is_empty());
    }
}
