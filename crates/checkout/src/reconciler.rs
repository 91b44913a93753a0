//! Idempotent reconciliation of asynchronous payment-outcome events.

use chrono::Utc;
use domain::{Order, OrderStatus, PaymentEventRecord, PaymentOutcome, ReservationStatus};
use inventory::{InventoryError, InventoryLedger};
use store::{CartStore, InventoryStore, OrderStore, PaymentEventStore};

use crate::error::ReconcileError;
use crate::order_ops::{OrderApplyError, apply_order_transition};
use crate::services::cache::{CacheInvalidator, CacheTag};
use crate::services::notification::NotificationService;

/// A payment-outcome event as delivered by the processor's webhook, after
/// signature verification and payload validation at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Processor-assigned unique event id (the idempotency key).
    pub external_event_id: String,
    /// The payment session the outcome refers to.
    pub session_ref: String,
    pub outcome: PaymentOutcome,
}

/// Acknowledgement returned to the webhook caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The event was applied.
    Processed,
    /// The event id was seen before and already applied; nothing happened.
    Duplicate,
    /// No order matches the session; recorded and acknowledged so the
    /// processor stops redelivering.
    UnknownOrder,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Processed => "processed",
            Ack::Duplicate => "duplicate",
            Ack::UnknownOrder => "unknown_order",
        }
    }
}

/// Consumes payment-outcome events exactly once and drives the order
/// lifecycle accordingly.
///
/// Delivery is at-least-once and possibly reordered; the external event id
/// gates re-application (first writer wins), and every sub-operation
/// (commit, release, status transition, cart clearing) is itself idempotent
/// so an interrupted run can be safely replayed by redelivery.
pub struct PaymentReconciler<S, N, C> {
    store: S,
    ledger: InventoryLedger<S>,
    notifications: N,
    cache: C,
    /// Alert when a product's availability lands at or below this.
    low_stock_threshold: Option<i64>,
}

impl<S, N, C> PaymentReconciler<S, N, C>
where
    S: PaymentEventStore + OrderStore + CartStore + InventoryStore + Clone,
    N: NotificationService,
    C: CacheInvalidator,
{
    /// Creates a new reconciler.
    pub fn new(
        store: S,
        ledger: InventoryLedger<S>,
        notifications: N,
        cache: C,
        low_stock_threshold: Option<i64>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifications,
            cache,
            low_stock_threshold,
        }
    }

    /// Handles one webhook event.
    ///
    /// Business anomalies (duplicates, unknown orders) are acknowledged;
    /// only transient store failures surface as errors so the processor's
    /// retry mechanism redelivers.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.external_event_id, outcome = %event.outcome))]
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<Ack, ReconcileError> {
        metrics::counter!("payment_events_received_total").increment(1);

        // Idempotency gate: the first insert of this event id wins
        let record = PaymentEventRecord::received(
            event.external_event_id.clone(),
            event.session_ref.clone(),
            event.outcome,
            Utc::now(),
        );

        if !self.store.insert_event_if_new(&record).await? {
            let existing = self.store.get_event(&event.external_event_id).await?;
            match existing {
                Some(e) if e.processed => {
                    metrics::counter!("payment_events_duplicate_total").increment(1);
                    tracing::info!("duplicate payment event acknowledged");
                    return Ok(Ack::Duplicate);
                }
                _ => {
                    // A previous attempt recorded the event but died before
                    // finishing; every sub-operation below is idempotent, so
                    // run it again.
                    tracing::warn!("re-processing incomplete payment event");
                }
            }
        }

        // Resolve the order by its payment session
        let Some(order) = self
            .store
            .find_order_by_payment_session(&event.session_ref)
            .await?
        else {
            tracing::warn!(session_ref = %event.session_ref, "payment event for unknown order");
            let mut record = record;
            record.processed = true;
            self.store.update_event(&record).await?;
            metrics::counter!("payment_events_unknown_order_total").increment(1);
            return Ok(Ack::UnknownOrder);
        };

        match event.outcome {
            PaymentOutcome::Succeeded => self.apply_success(&order).await?,
            PaymentOutcome::Failed | PaymentOutcome::Expired => {
                self.apply_failure(&order).await?
            }
        }

        // Mark the event applied; until this lands, redelivery re-runs the
        // idempotent work above rather than double-applying it
        let mut record = record;
        record.order_id = Some(order.id);
        record.processed = true;
        self.store.update_event(&record).await?;

        metrics::counter!("payment_events_processed_total").increment(1);
        Ok(Ack::Processed)
    }

    /// Payment success: commit every reservation, move the order to
    /// processing, clear the originating cart, fire side effects.
    async fn apply_success(&self, order: &Order) -> Result<(), ReconcileError> {
        if matches!(
            order.status,
            OrderStatus::Cancelled | OrderStatus::Refunded
        ) {
            // The order was cancelled (e.g. by the stale-pending sweep)
            // before the success landed; money and stock now disagree and
            // someone has to look at it.
            tracing::error!(order_id = %order.id, status = %order.status, "payment success for already-cancelled order");
            return Ok(());
        }

        // If the TTL sweep already released any hold, the stock backing
        // this order is gone; cancel instead of overselling.
        for reservation_id in &order.reservation_ids {
            if let Some(r) = self.ledger.reservation(*reservation_id).await?
                && r.status == ReservationStatus::Released
            {
                tracing::error!(order_id = %order.id, %reservation_id, "reservation expired before payment success, cancelling order");
                return self.apply_failure(order).await;
            }
        }

        for reservation_id in &order.reservation_ids {
            match self.ledger.commit(*reservation_id).await {
                Ok(_) => {}
                Err(InventoryError::AlreadyReleased { .. }) => {
                    // Lost the race with the sweep after the check above
                    tracing::error!(order_id = %order.id, %reservation_id, "reservation released mid-commit");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let order = apply_order_transition(&self.store, order.id, |order| {
            if order.status == OrderStatus::Processing {
                return Ok(false);
            }
            order.mark_paid(Utc::now())?;
            Ok(true)
        })
        .await
        .map_err(map_apply_error)?;

        // The originating cart is destroyed on successful checkout
        self.store.delete_cart(&order.cart_identity).await?;

        // Side effects are fire-and-forget: failures are logged, never
        // fatal to the transition that triggered them
        if let Err(e) = self
            .notifications
            .send_order_confirmation(order.id, &order.customer.email)
            .await
        {
            tracing::warn!(order_id = %order.id, error = %e, "order confirmation failed");
        }

        if let Some(threshold) = self.low_stock_threshold {
            for line in order.lines() {
                match self.ledger.record(&line.product_id).await {
                    Ok(Some(record)) if record.available() <= threshold => {
                        if let Err(e) = self
                            .notifications
                            .send_low_stock_alert(&line.product_id, record.available())
                            .await
                        {
                            tracing::warn!(product_id = %line.product_id, error = %e, "low stock alert failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(product_id = %line.product_id, error = %e, "low stock check failed");
                    }
                }
            }
        }

        self.invalidate(&order).await;
        tracing::info!(order_id = %order.id, "order paid");
        Ok(())
    }

    /// Payment failure or expiry: release every reservation and cancel the
    /// pending order.
    async fn apply_failure(&self, order: &Order) -> Result<(), ReconcileError> {
        for reservation_id in &order.reservation_ids {
            match self.ledger.release(*reservation_id).await {
                Ok(_) => {}
                Err(InventoryError::ReservationNotFound(_)) => {
                    tracing::warn!(order_id = %order.id, %reservation_id, "reservation missing during release");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let order = apply_order_transition(&self.store, order.id, |order| {
            match order.status {
                OrderStatus::Pending => {
                    order.cancel(Utc::now())?;
                    Ok(true)
                }
                OrderStatus::Cancelled => Ok(false),
                // A late failure for an order that already succeeded does
                // not undo the payment
                other => {
                    tracing::warn!(order_id = %order.id, status = %other, "ignoring payment failure for non-pending order");
                    Ok(false)
                }
            }
        })
        .await
        .map_err(map_apply_error)?;

        self.invalidate(&order).await;
        tracing::info!(order_id = %order.id, status = %order.status, "payment failure reconciled");
        Ok(())
    }

    async fn invalidate(&self, order: &Order) {
        let tags = [
            CacheTag::Inventory,
            CacheTag::Orders,
            CacheTag::Order(order.id),
        ];
        if let Err(e) = self.cache.invalidate(&tags).await {
            tracing::warn!(order_id = %order.id, error = %e, "cache invalidation failed");
        }
    }
}

fn map_apply_error(e: OrderApplyError) -> ReconcileError {
    match e {
        OrderApplyError::NotFound(id) => ReconcileError::Store(store::StoreError::NotFound {
            entity: "order",
            key: id.to_string(),
        }),
        // An invalid transition here means state the guards above did not
        // anticipate; surface it as a store-shaped error for redelivery
        OrderApplyError::Order(e) => {
            tracing::error!(error = %e, "unexpected order state during reconciliation");
            ReconcileError::Store(store::StoreError::NotFound {
                entity: "order_transition",
                key: e.to_string(),
            })
        }
        OrderApplyError::Store(e) => ReconcileError::Store(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{OrderId, ReservationId};
    use domain::{
        Address, Cart, CartIdentity, CustomerInfo, InventoryRecord, LineKey, Money, NewOrder,
        OrderLine, ProductId, SessionToken, ShippingMethod, Totals,
    };
    use store::InMemoryStore;

    use crate::services::cache::InMemoryCacheInvalidator;
    use crate::services::notification::InMemoryNotificationService;

    type TestReconciler =
        PaymentReconciler<InMemoryStore, InMemoryNotificationService, InMemoryCacheInvalidator>;

    struct Setup {
        reconciler: TestReconciler,
        store: InMemoryStore,
        ledger: InventoryLedger<InMemoryStore>,
        notifications: InMemoryNotificationService,
        cache: InMemoryCacheInvalidator,
    }

    fn setup() -> Setup {
        let store = InMemoryStore::new();
        let ledger = InventoryLedger::new(store.clone());
        let notifications = InMemoryNotificationService::new();
        let cache = InMemoryCacheInvalidator::new();
        let reconciler = PaymentReconciler::new(
            store.clone(),
            ledger.clone(),
            notifications.clone(),
            cache.clone(),
            Some(2),
        );
        Setup {
            reconciler,
            store,
            ledger,
            notifications,
            cache,
        }
    }

    fn address() -> Address {
        Address {
            line1: "1 Main St".to_string(),
            line2: None,
            city: "Springfield".to_string(),
            region: "CA".to_string(),
            postal_code: "90000".to_string(),
            country: "US".to_string(),
        }
    }

    /// Seeds stock, an active reservation and a pending order wired to a
    /// payment session, the way checkout leaves them.
    async fn seed_pending_order(
        s: &Setup,
        sku: &str,
        total_stock: i64,
        quantity: u32,
        session_ref: &str,
    ) -> OrderId {
        s.store
            .upsert_inventory(InventoryRecord::new(sku, total_stock))
            .await
            .unwrap();

        let order_id = OrderId::new();
        let reservation = s
            .ledger
            .reserve(
                order_id,
                &ProductId::new(sku),
                i64::from(quantity),
                ReservationId::new(),
                Duration::minutes(15),
                Utc::now(),
            )
            .await
            .unwrap();

        let identity = CartIdentity::Guest(SessionToken::new(format!("guest-{session_ref}")));
        let mut cart = Cart::new(identity.clone());
        cart.add_item(LineKey::product(sku), quantity).unwrap();
        s.store.put_cart(&cart).await.unwrap();

        let line = OrderLine::new(sku, None, "Widget", quantity, Money::from_cents(1000));
        let subtotal = line.line_total();
        let mut order = Order::open(
            NewOrder {
                id: order_id,
                cart_identity: identity,
                customer: CustomerInfo {
                    customer_id: None,
                    email: "shopper@example.com".to_string(),
                    name: "Pat Shopper".to_string(),
                },
                shipping_address: address(),
                billing_address: address(),
                shipping_method: ShippingMethod::Standard,
                lines: vec![line],
                totals: Totals::derive(subtotal, Money::zero(), Money::zero()),
                reservation_ids: vec![reservation.id],
            },
            Utc::now(),
        )
        .unwrap();
        order.attach_payment_session(session_ref);
        s.store.insert_order(&order).await.unwrap();

        order_id
    }

    fn event(id: &str, session: &str, outcome: PaymentOutcome) -> WebhookEvent {
        WebhookEvent {
            external_event_id: id.to_string(),
            session_ref: session.to_string(),
            outcome,
        }
    }

    #[tokio::test]
    async fn success_commits_and_starts_processing() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;

        let ack = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.paid_at.is_some());

        let record = s
            .ledger
            .record(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.committed, 3);
        assert_eq!(record.reserved, 0);

        // The originating cart is gone
        assert!(s.store.get_cart(&order.cart_identity).await.unwrap().is_none());

        // Confirmation went out
        assert_eq!(s.notifications.confirmations().len(), 1);

        // Cache tags were invalidated
        assert!(s.cache.was_invalidated(&CacheTag::Inventory));
        assert!(s.cache.was_invalidated(&CacheTag::Order(order_id)));
    }

    #[tokio::test]
    async fn duplicate_event_is_acknowledged_without_side_effects() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;

        let first = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(first, Ack::Processed);

        let second = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(second, Ack::Duplicate);

        // Committed inventory increased exactly once
        let record = s
            .ledger
            .record(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.committed, 3);

        // The order transitioned once
        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        // One confirmation, not two
        assert_eq!(s.notifications.confirmations().len(), 1);
    }

    #[tokio::test]
    async fn failed_event_releases_and_cancels() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;

        let ack = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Failed))
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());

        // Stock back in the pool
        assert_eq!(
            s.ledger.available(&ProductId::new("SKU-001")).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn expired_event_behaves_like_failure() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 2, "sess-1").await;

        s.reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Expired))
            .await
            .unwrap();

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_order_is_recorded_and_acknowledged() {
        let s = setup();

        let ack = s
            .reconciler
            .handle_event(event("evt-1", "sess-nowhere", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(ack, Ack::UnknownOrder);

        // Redelivery of the same event is a duplicate, not a storm
        let again = s
            .reconciler
            .handle_event(event("evt-1", "sess-nowhere", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(again, Ack::Duplicate);
    }

    #[tokio::test]
    async fn notification_failure_never_fails_reconciliation() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;
        s.notifications.set_fail(true);

        let ack = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn low_stock_alert_fires_when_threshold_crossed() {
        let s = setup();
        // 5 total, 3 sold leaves 2 available, at the threshold of 2
        seed_pending_order(&s, "SKU-001", 5, 3, "sess-1").await;

        s.reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();

        let alerts = s.notifications.low_stock_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1, 2);
    }

    #[tokio::test]
    async fn late_failure_does_not_undo_success() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;

        s.reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        let ack = s
            .reconciler
            .handle_event(event("evt-2", "sess-1", PaymentOutcome::Failed))
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        let record = s
            .ledger
            .record(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.committed, 3);
    }

    #[tokio::test]
    async fn success_after_expiry_release_cancels_instead_of_overselling() {
        let s = setup();
        let order_id = seed_pending_order(&s, "SKU-001", 10, 3, "sess-1").await;

        // The sweep releases the hold before the success lands
        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        for reservation_id in &order.reservation_ids {
            s.ledger.release(*reservation_id).await.unwrap();
        }

        let ack = s
            .reconciler
            .handle_event(event("evt-1", "sess-1", PaymentOutcome::Succeeded))
            .await
            .unwrap();
        assert_eq!(ack, Ack::Processed);

        let order = s.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        // Nothing was committed
        let record = s
            .ledger
            .record(&ProductId::new("SKU-001"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.committed, 0);
        assert_eq!(record.available(), 10);
    }
}
