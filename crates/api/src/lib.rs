//! HTTP API server for the storefront core.
//!
//! Wires the cart service, checkout orchestrator, payment reconciler and
//! order lifecycle over a shared record store, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use cart::CartService;
use checkout::{
    CheckoutOrchestrator, InMemoryCacheInvalidator, InMemoryCatalog, InMemoryNotificationService,
    InMemoryPaymentProcessor, OrderLifecycle, PaymentReconciler, StalePendingSweeper,
};
use inventory::{InventoryLedger, ReservationSweeper};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CartStore, InventoryStore, OrderStore, PaymentEventStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Everything the API needs from a record store backend.
pub trait Stores:
    CartStore + OrderStore + InventoryStore + PaymentEventStore + Clone + Send + Sync + 'static
{
}

impl<T> Stores for T where
    T: CartStore + OrderStore + InventoryStore + PaymentEventStore + Clone + Send + Sync + 'static
{
}

/// Shared application state accessible from all handlers.
pub struct AppState<S: Stores> {
    pub cart_service: CartService<S>,
    pub orchestrator:
        CheckoutOrchestrator<S, InMemoryCatalog, InMemoryPaymentProcessor, InMemoryCacheInvalidator>,
    pub reconciler: PaymentReconciler<S, InMemoryNotificationService, InMemoryCacheInvalidator>,
    pub lifecycle: OrderLifecycle<S, InMemoryPaymentProcessor, InMemoryCacheInvalidator>,
    pub ledger: InventoryLedger<S>,
    pub catalog: InMemoryCatalog,
    pub payment: InMemoryPaymentProcessor,
    pub notifications: InMemoryNotificationService,
    pub cache: InMemoryCacheInvalidator,
    pub config: Config,
}

/// Background tasks that accompany the server.
pub struct Sweepers<S: Stores> {
    pub reservations: ReservationSweeper<S>,
    pub stale_orders: StalePendingSweeper<S, InMemoryPaymentProcessor, InMemoryCacheInvalidator>,
}

/// Creates the application state and sweepers over the given store, with
/// in-memory external collaborators.
pub fn create_default_state<S: Stores>(store: S, config: Config) -> (Arc<AppState<S>>, Sweepers<S>) {
    let ledger = InventoryLedger::new(store.clone());
    let catalog = InMemoryCatalog::new();
    let payment = InMemoryPaymentProcessor::new();
    let notifications = InMemoryNotificationService::new();
    let cache = InMemoryCacheInvalidator::new();

    let cart_service = CartService::new(store.clone(), ledger.clone());
    let orchestrator = CheckoutOrchestrator::new(
        store.clone(),
        ledger.clone(),
        catalog.clone(),
        payment.clone(),
        cache.clone(),
        config.checkout_config(),
    );
    let reconciler = PaymentReconciler::new(
        store.clone(),
        ledger.clone(),
        notifications.clone(),
        cache.clone(),
        config.low_stock_threshold,
    );
    let lifecycle = OrderLifecycle::new(
        store.clone(),
        ledger.clone(),
        payment.clone(),
        cache.clone(),
    );

    let sweep_interval = std::time::Duration::from_secs(config.sweep_interval_secs);
    let sweepers = Sweepers {
        reservations: ReservationSweeper::new(ledger.clone(), sweep_interval),
        stale_orders: StalePendingSweeper::new(
            OrderLifecycle::new(
                store.clone(),
                ledger.clone(),
                payment.clone(),
                cache.clone(),
            ),
            chrono::Duration::seconds(config.pending_grace_secs),
            sweep_interval,
        ),
    };

    let state = Arc::new(AppState {
        cart_service,
        orchestrator,
        reconciler,
        lifecycle,
        ledger,
        catalog,
        payment,
        notifications,
        cache,
        config,
    });

    (state, sweepers)
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Stores>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart", delete(routes::cart::clear::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items", put(routes::cart::update_item::<S>))
        .route("/cart/items", delete(routes::cart::remove_item::<S>))
        .route("/cart/merge", post(routes::cart::merge::<S>))
        .route("/checkout", post(routes::checkout::initiate::<S>))
        .route("/webhooks/payment", post(routes::webhooks::payment::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/admin/orders/{id}/status",
            post(routes::admin::update_order_status::<S>),
        )
        .route("/admin/inventory", get(routes::admin::list_inventory::<S>))
        .route(
            "/admin/inventory/{product_id}",
            post(routes::admin::adjust_inventory::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
