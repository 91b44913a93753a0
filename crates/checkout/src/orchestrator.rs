//! Checkout orchestration: validate, reserve, price, open payment.

use chrono::{Duration, Utc};
use common::{OrderId, ReservationId};
use domain::{
    CartIdentity, CustomerInfo, NewOrder, Order, OrderLine, Reservation, ShippingMethod, Totals,
};
use domain::{Address, Money};
use inventory::InventoryLedger;
use store::{CartStore, InventoryStore, OrderStore};

use crate::error::CheckoutError;
use crate::pricing::{ShippingRates, TaxTable};
use crate::services::cache::{CacheInvalidator, CacheTag};
use crate::services::catalog::ProductCatalog;
use crate::services::payment::PaymentProcessor;

/// Checkout configuration. TTLs, rate tables and redirect references are
/// configuration, not constants.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// How long a reservation holds stock without a payment outcome.
    pub reservation_ttl: Duration,
    /// Redirect reference handed to the payment processor for success.
    pub success_ref: String,
    /// Redirect reference handed to the payment processor for cancel.
    pub cancel_ref: String,
    pub tax_table: TaxTable,
    pub shipping_rates: ShippingRates,
}

/// A checkout request after input validation.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: CustomerInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_method: ShippingMethod,
}

/// What the caller needs to continue: the order and the payment session to
/// redirect to.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub payment_session_ref: String,
    pub totals: Totals,
}

/// Drives checkout: cart validation, all-or-nothing inventory reservation,
/// total computation, order creation, payment-session opening.
///
/// The multi-line reservation is a saga: reservations are taken in
/// deterministic product order and every already-acquired hold is released
/// before any failure returns. No inventory lock is held across the
/// payment-processor call.
pub struct CheckoutOrchestrator<S, Cat, Pay, Inv> {
    store: S,
    ledger: InventoryLedger<S>,
    catalog: Cat,
    payment: Pay,
    cache: Inv,
    config: CheckoutConfig,
}

impl<S, Cat, Pay, Inv> CheckoutOrchestrator<S, Cat, Pay, Inv>
where
    S: CartStore + OrderStore + InventoryStore + Clone,
    Cat: ProductCatalog,
    Pay: PaymentProcessor,
    Inv: CacheInvalidator,
{
    /// Creates a new orchestrator.
    pub fn new(
        store: S,
        ledger: InventoryLedger<S>,
        catalog: Cat,
        payment: Pay,
        cache: Inv,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            catalog,
            payment,
            cache,
            config,
        }
    }

    /// Initiates checkout for an identity's cart.
    ///
    /// On success the cart still exists; it is cleared when the payment
    /// outcome confirms. On any failure after reservations were taken, all
    /// of them are released before this returns.
    #[tracing::instrument(skip(self, request))]
    pub async fn initiate(
        &self,
        identity: &CartIdentity,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        metrics::counter!("checkout_initiated_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run(identity, request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::counter!("checkout_failed_total").increment(1);
        }
        result
    }

    async fn run(
        &self,
        identity: &CartIdentity,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        // 1. The cart must exist and have lines
        let cart = self
            .store
            .get_cart(identity)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        if !request.shipping_address.is_complete() {
            return Err(CheckoutError::Validation(
                "shipping address is incomplete".to_string(),
            ));
        }
        if !request.billing_address.is_complete() {
            return Err(CheckoutError::Validation(
                "billing address is incomplete".to_string(),
            ));
        }

        // 2. Every line's product must be currently sellable; snapshot
        //    names and prices while we are at it
        let mut lines: Vec<OrderLine> = Vec::with_capacity(cart.line_count());
        for (key, quantity) in cart.lines() {
            let info = self
                .catalog
                .product(&key.product_id)
                .await
                .map_err(|e| {
                    tracing::warn!(product_id = %key.product_id, error = %e, "catalog lookup failed");
                    CheckoutError::ProductUnavailable(key.product_id.clone())
                })?
                .filter(|p| p.active)
                .ok_or_else(|| CheckoutError::ProductUnavailable(key.product_id.clone()))?;

            lines.push(OrderLine::new(
                key.product_id.clone(),
                key.variant_id.clone(),
                info.name,
                quantity,
                info.unit_price,
            ));
        }

        // 3. Reserve every line, all-or-nothing. Cart lines iterate in
        //    product order, so concurrent checkouts contend in the same
        //    sequence.
        let order_id = OrderId::new();
        let now = Utc::now();
        let mut reservations: Vec<Reservation> = Vec::with_capacity(lines.len());

        for line in &lines {
            let result = self
                .ledger
                .reserve(
                    order_id,
                    &line.product_id,
                    i64::from(line.quantity),
                    ReservationId::new(),
                    self.config.reservation_ttl,
                    now,
                )
                .await;

            match result {
                Ok(reservation) => reservations.push(reservation),
                Err(e) => {
                    self.release_all(&reservations).await;
                    return Err(e.into());
                }
            }
        }

        // 4. Totals from the snapshot prices
        let subtotal: Money = lines.iter().map(|l| l.line_total()).sum();
        let tax = self
            .config
            .tax_table
            .tax_on(subtotal, &request.shipping_address.region);
        let shipping = self
            .config
            .shipping_rates
            .cost_for(request.shipping_method, subtotal);
        let totals = Totals::derive(subtotal, tax, shipping);

        // 5. Open the pending order
        let order = match self.open_order(order_id, identity, request, lines, totals, &reservations)
        {
            Ok(order) => order,
            Err(e) => {
                self.release_all(&reservations).await;
                return Err(e);
            }
        };
        let mut order = order;
        match self.store.insert_order(&order).await {
            Ok(version) => order.version = version,
            Err(e) => {
                self.release_all(&reservations).await;
                return Err(e.into());
            }
        }

        // 6. Open the payment session. Nothing is locked here; a reserve is
        //    a committed counter change, not a held lock.
        let session = match self
            .payment
            .create_session(
                order_id,
                order.lines(),
                totals,
                &self.config.success_ref,
                &self.config.cancel_ref,
            )
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.release_all(&reservations).await;
                self.cancel_unpaid_order(order_id).await;
                return Err(CheckoutError::Payment(e));
            }
        };

        order.attach_payment_session(session.session_ref.as_str());
        if let Err(e) = self.store.update_order(&order).await {
            self.release_all(&reservations).await;
            self.cancel_unpaid_order(order_id).await;
            return Err(e.into());
        }

        // Side effects never block or fail checkout
        if let Err(e) = self
            .cache
            .invalidate(&[CacheTag::Inventory, CacheTag::Orders])
            .await
        {
            tracing::warn!(error = %e, "cache invalidation failed after checkout");
        }

        tracing::info!(%order_id, session_ref = %session.session_ref, total = %totals.total, "checkout initiated");
        Ok(CheckoutReceipt {
            order_id,
            payment_session_ref: session.session_ref,
            totals,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn open_order(
        &self,
        order_id: OrderId,
        identity: &CartIdentity,
        request: CheckoutRequest,
        lines: Vec<OrderLine>,
        totals: Totals,
        reservations: &[Reservation],
    ) -> Result<Order, CheckoutError> {
        let order = Order::open(
            NewOrder {
                id: order_id,
                cart_identity: identity.clone(),
                customer: request.customer,
                shipping_address: request.shipping_address,
                billing_address: request.billing_address,
                shipping_method: request.shipping_method,
                lines,
                totals,
                reservation_ids: reservations.iter().map(|r| r.id).collect(),
            },
            Utc::now(),
        )?;
        Ok(order)
    }

    /// Compensation: releases every reservation acquired in this attempt,
    /// most recent first. Release failures are logged; the original error
    /// stays the caller's answer.
    async fn release_all(&self, reservations: &[Reservation]) {
        for reservation in reservations.iter().rev() {
            if let Err(e) = self.ledger.release(reservation.id).await {
                tracing::error!(
                    reservation_id = %reservation.id,
                    product_id = %reservation.product_id,
                    error = %e,
                    "failed to release reservation during checkout rollback"
                );
            }
        }
        if !reservations.is_empty() {
            metrics::counter!("checkout_rollbacks_total").increment(1);
        }
    }

    /// Best-effort cancel of an order whose payment session never opened.
    async fn cancel_unpaid_order(&self, order_id: OrderId) {
        let result = crate::order_ops::apply_order_transition(&self.store, order_id, |order| {
            if order.status == domain::OrderStatus::Cancelled {
                return Ok(false);
            }
            order.cancel(Utc::now())?;
            Ok(true)
        })
        .await;

        if let Err(crate::order_ops::OrderApplyError::Store(e)) = result {
            tracing::error!(%order_id, error = %e, "failed to cancel order after payment-session failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Cart, InventoryRecord, LineKey, OrderStatus, ProductId, SessionToken};
    use store::InMemoryStore;

    use crate::services::cache::InMemoryCacheInvalidator;
    use crate::services::catalog::InMemoryCatalog;
    use crate::services::payment::InMemoryPaymentProcessor;

    type TestOrchestrator = CheckoutOrchestrator<
        InMemoryStore,
        InMemoryCatalog,
        InMemoryPaymentProcessor,
        InMemoryCacheInvalidator,
    >;

    struct Setup {
        orchestrator: TestOrchestrator,
        store: InMemoryStore,
        ledger: InventoryLedger<InMemoryStore>,
        catalog: InMemoryCatalog,
        payment: InMemoryPaymentProcessor,
        cache: InMemoryCacheInvalidator,
    }

    fn config() -> CheckoutConfig {
        CheckoutConfig {
            reservation_ttl: Duration::minutes(15),
            success_ref: "/checkout/success".to_string(),
            cancel_ref: "/checkout/cancel".to_string(),
            tax_table: TaxTable::with_default(600).with_rate("CA", 825),
            shipping_rates: ShippingRates {
                standard: Money::from_cents(500),
                express: Money::from_cents(1500),
                free_shipping_threshold: Some(Money::from_cents(10_000)),
            },
        }
    }

    fn setup() -> Setup {
        let store = InMemoryStore::new();
        let ledger = InventoryLedger::new(store.clone());
        let catalog = InMemoryCatalog::new();
        let payment = InMemoryPaymentProcessor::new();
        let cache = InMemoryCacheInvalidator::new();

        let orchestrator = CheckoutOrchestrator::new(
            store.clone(),
            ledger.clone(),
            catalog.clone(),
            payment.clone(),
            cache.clone(),
            config(),
        );

        Setup {
            orchestrator,
            store,
            ledger,
            catalog,
            payment,
            cache,
        }
    }

    async fn stock(setup: &Setup, sku: &str, total: i64, price_cents: i64) {
        setup
            .store
            .upsert_inventory(InventoryRecord::new(sku, total))
            .await
            .unwrap();
        setup
            .catalog
            .insert(sku, &format!("Product {sku}"), Money::from_cents(price_cents));
    }

    async fn cart_with(setup: &Setup, identity: &CartIdentity, items: &[(&str, u32)]) {
        let mut cart = Cart::new(identity.clone());
        for (sku, qty) in items {
            cart.add_item(LineKey::product(*sku), *qty).unwrap();
        }
        setup.store.put_cart(&cart).await.unwrap();
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            customer: CustomerInfo {
                customer_id: None,
                email: "shopper@example.com".to_string(),
                name: "Pat Shopper".to_string(),
            },
            shipping_address: address("CA"),
            billing_address: address("CA"),
            shipping_method: ShippingMethod::Standard,
        }
    }

    fn address(region: &str) -> Address {
        Address {
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            region: region.to_string(),
            postal_code: "90000".to_string(),
            country: "US".to_string(),
        }
    }

    fn guest(token: &str) -> CartIdentity {
        CartIdentity::Guest(SessionToken::new(token))
    }

    #[tokio::test]
    async fn happy_path_reserves_and_opens_session() {
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        stock(&s, "SKU-B", 10, 2500).await;
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 2), ("SKU-B", 1)]).await;

        let receipt = s.orchestrator.initiate(&identity, request()).await.unwrap();

        assert_eq!(receipt.payment_session_ref, "PSESS-0001");

        // Order is pending with the session attached
        let order = s.store.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(
            order.payment_session_ref.as_deref(),
            Some("PSESS-0001")
        );
        assert_eq!(order.reservation_ids.len(), 2);

        // Stock is held
        assert_eq!(s.ledger.available(&ProductId::new("SKU-A")).await.unwrap(), 8);
        assert_eq!(s.ledger.available(&ProductId::new("SKU-B")).await.unwrap(), 9);

        // The cart survives until payment confirms
        assert!(s.store.get_cart(&identity).await.unwrap().is_some());

        // Mutations invalidate the cache
        assert!(s.cache.was_invalidated(&CacheTag::Inventory));
        assert!(s.cache.was_invalidated(&CacheTag::Orders));
    }

    #[tokio::test]
    async fn totals_snapshot_prices_tax_and_shipping() {
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 2)]).await;

        let receipt = s.orchestrator.initiate(&identity, request()).await.unwrap();

        // subtotal 2000, CA tax 8.25% = 165, standard shipping 500
        assert_eq!(receipt.totals.subtotal.cents(), 2000);
        assert_eq!(receipt.totals.tax.cents(), 165);
        assert_eq!(receipt.totals.shipping.cents(), 500);
        assert_eq!(receipt.totals.total.cents(), 2665);

        let order = s.store.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.lines()[0].unit_price.cents(), 1000);
    }

    #[tokio::test]
    async fn free_shipping_over_threshold() {
        let s = setup();
        stock(&s, "SKU-A", 100, 2500).await;
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 5)]).await; // subtotal 12500

        let receipt = s.orchestrator.initiate(&identity, request()).await.unwrap();
        assert!(receipt.totals.shipping.is_zero());
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let s = setup();
        let identity = guest("guest-1");

        let result = s.orchestrator.initiate(&identity, request()).await;
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));

        // An existing but empty cart is the same answer
        s.store.put_cart(&Cart::new(identity.clone())).await.unwrap();
        let result = s.orchestrator.initiate(&identity, request()).await;
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    }

    #[tokio::test]
    async fn inactive_product_is_rejected_before_reserving() {
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        s.catalog.set_active(&ProductId::new("SKU-A"), false);
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 1)]).await;

        let result = s.orchestrator.initiate(&identity, request()).await;
        assert!(matches!(
            result,
            Err(CheckoutError::ProductUnavailable(_))
        ));
        assert_eq!(s.ledger.available(&ProductId::new("SKU-A")).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn unknown_product_is_rejected() {
        let s = setup();
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-GONE", 1)]).await;

        let result = s.orchestrator.initiate(&identity, request()).await;
        assert!(matches!(
            result,
            Err(CheckoutError::ProductUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn saga_rollback_releases_acquired_reservations() {
        // Cart {A: 2, B: 100} with available(B) = 1: A reserves, B fails,
        // A's hold must be released before the error returns.
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        stock(&s, "SKU-B", 1, 2000).await;
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 2), ("SKU-B", 100)]).await;

        let result = s.orchestrator.initiate(&identity, request()).await;

        match result {
            Err(CheckoutError::Inventory(inventory::InventoryError::Insufficient {
                product_id,
                requested,
                available,
            })) => {
                assert_eq!(product_id, ProductId::new("SKU-B"));
                assert_eq!(requested, 100);
                assert_eq!(available, 1);
            }
            other => panic!("expected Insufficient for SKU-B, got {other:?}"),
        }

        // reserved(A) is back to its pre-checkout value
        assert_eq!(s.ledger.available(&ProductId::new("SKU-A")).await.unwrap(), 10);
        let record = s.ledger.record(&ProductId::new("SKU-A")).await.unwrap().unwrap();
        assert_eq!(record.reserved, 0);

        // No order was created
        assert_eq!(s.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn payment_failure_releases_and_cancels() {
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        s.payment.set_fail_on_create(true);
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 2)]).await;

        let result = s.orchestrator.initiate(&identity, request()).await;
        assert!(matches!(result, Err(CheckoutError::Payment(_))));

        // Stock returned
        assert_eq!(s.ledger.available(&ProductId::new("SKU-A")).await.unwrap(), 10);

        // The pending order became cancelled
        let cancelled: Vec<_> = s
            .store
            .pending_orders_created_before(Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert!(cancelled.is_empty());
    }

    #[tokio::test]
    async fn incomplete_address_is_validation_error() {
        let s = setup();
        stock(&s, "SKU-A", 10, 1000).await;
        let identity = guest("guest-1");
        cart_with(&s, &identity, &[("SKU-A", 1)]).await;

        let mut req = request();
        req.shipping_address.city = String::new();

        let result = s.orchestrator.initiate(&identity, req).await;
        assert!(matches!(result, Err(CheckoutError::Validation(_))));
    }

    #[tokio::test]
    async fn two_checkouts_contending_for_stock() {
        // totalStock = 5; two concurrent checkouts wanting 3 each: exactly
        // one succeeds, the other gets InsufficientInventory.
        let s = setup();
        stock(&s, "SKU-A", 5, 1000).await;

        let id1 = guest("guest-1");
        let id2 = guest("guest-2");
        cart_with(&s, &id1, &[("SKU-A", 3)]).await;
        cart_with(&s, &id2, &[("SKU-A", 3)]).await;

        let o1 = s.orchestrator;
        let o2 = CheckoutOrchestrator::new(
            s.store.clone(),
            s.ledger.clone(),
            s.catalog.clone(),
            s.payment.clone(),
            s.cache.clone(),
            config(),
        );

        let t1 = tokio::spawn(async move { o1.initiate(&id1, request()).await });
        let t2 = tokio::spawn(async move { o2.initiate(&id2, request()).await });
        let results = [t1.await.unwrap(), t2.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert_eq!(s.ledger.available(&ProductId::new("SKU-A")).await.unwrap(), 2);
    }
}
