//! Checkout orchestration, payment reconciliation and order lifecycle.
//!
//! Bridges the synchronous checkout request with the asynchronous payment
//! outcome:
//!
//! - [`CheckoutOrchestrator`] validates the cart, reserves stock
//!   all-or-nothing, prices the order and opens a payment session;
//! - [`PaymentReconciler`] consumes webhook events exactly once and commits
//!   or releases the reservations;
//! - [`OrderLifecycle`] applies the remaining transitions with their
//!   compensating inventory actions.

mod error;
mod lifecycle;
mod order_ops;
mod orchestrator;
mod pricing;
mod reconciler;
pub mod services;

pub use error::{CheckoutError, LifecycleError, ReconcileError};
pub use lifecycle::{OrderLifecycle, StalePendingSweeper};
pub use orchestrator::{CheckoutConfig, CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest};
pub use pricing::{ShippingRates, TaxTable};
pub use reconciler::{Ack, PaymentReconciler, WebhookEvent};
pub use services::ServiceError;
pub use services::cache::{CacheInvalidator, CacheTag, InMemoryCacheInvalidator};
pub use services::catalog::{InMemoryCatalog, ProductCatalog, ProductInfo};
pub use services::notification::{InMemoryNotificationService, NotificationService};
pub use services::payment::{InMemoryPaymentProcessor, PaymentProcessor, PaymentSession};
