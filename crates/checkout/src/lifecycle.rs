//! Order lifecycle operations and their compensating inventory actions.

use chrono::{DateTime, Duration, Utc};
use common::OrderId;
use domain::{Order, OrderError, OrderStatus};
use inventory::{InventoryError, InventoryLedger};
use store::{InventoryStore, OrderStore};

use crate::error::LifecycleError;
use crate::order_ops::{OrderApplyError, apply_order_transition};
use crate::services::cache::{CacheInvalidator, CacheTag};
use crate::services::payment::PaymentProcessor;

/// Applies lifecycle transitions to orders, including the compensating
/// inventory actions:
///
/// - cancelling a `Pending` order releases its active reservations;
/// - cancelling a `Processing` order restocks the committed quantities;
/// - refunding restocks the committed quantities unless a cancellation
///   already did, and signals the payment processor.
pub struct OrderLifecycle<S, Pay, C> {
    store: S,
    ledger: InventoryLedger<S>,
    payment: Pay,
    cache: C,
}

impl<S, Pay, C> OrderLifecycle<S, Pay, C>
where
    S: OrderStore + InventoryStore + Clone,
    Pay: PaymentProcessor,
    C: CacheInvalidator,
{
    /// Creates a new lifecycle service.
    pub fn new(store: S, ledger: InventoryLedger<S>, payment: Pay, cache: C) -> Self {
        Self {
            store,
            ledger,
            payment,
            cache,
        }
    }

    /// Loads an order.
    pub async fn get(&self, order_id: OrderId) -> Result<Option<Order>, LifecycleError> {
        Ok(self.store.get_order(order_id).await?)
    }

    /// Admin entry point: drive an order to `target`.
    ///
    /// `Pending` and `Processing` cannot be set directly; they only arise
    /// from checkout and payment reconciliation.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<Order, LifecycleError> {
        match target {
            OrderStatus::Shipped => self.ship(order_id, tracking_number).await,
            OrderStatus::Delivered => self.deliver(order_id).await,
            OrderStatus::Cancelled => self.cancel(order_id).await,
            OrderStatus::Refunded => self.refund(order_id).await,
            OrderStatus::Pending | OrderStatus::Processing => Err(
                LifecycleError::UnsupportedStatus(target.as_str().to_string()),
            ),
        }
    }

    /// `Processing → Shipped`.
    #[tracing::instrument(skip(self))]
    pub async fn ship(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
    ) -> Result<Order, LifecycleError> {
        let order = apply_order_transition(&self.store, order_id, |order| {
            order.ship(tracking_number.clone(), Utc::now())?;
            Ok(true)
        })
        .await
        .map_err(|e| map_apply_error(e, order_id))?;

        self.invalidate(order_id).await;
        metrics::counter!("orders_shipped_total").increment(1);
        Ok(order)
    }

    /// `Shipped → Delivered`.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: OrderId) -> Result<Order, LifecycleError> {
        let order = apply_order_transition(&self.store, order_id, |order| {
            order.deliver(Utc::now())?;
            Ok(true)
        })
        .await
        .map_err(|e| map_apply_error(e, order_id))?;

        self.invalidate(order_id).await;
        metrics::counter!("orders_delivered_total").increment(1);
        Ok(order)
    }

    /// Explicit cancellation (customer or admin), allowed before shipment.
    ///
    /// A pending order releases its reservations; a processing (paid)
    /// order restocks its committed quantities.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, LifecycleError> {
        let current = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !current.status.can_cancel() {
            return Err(LifecycleError::Order(OrderError::InvalidTransition {
                from: current.status,
                action: "cancel",
            }));
        }

        let mut restock_won = false;
        let order = apply_order_transition(&self.store, order_id, |order| {
            let was_processing = order.status == OrderStatus::Processing;
            order.cancel(Utc::now())?;
            if was_processing {
                restock_won = order.mark_restocked(Utc::now());
            }
            Ok(true)
        })
        .await
        .map_err(|e| map_apply_error(e, order_id))?;

        if restock_won {
            // Paid stock goes back on the shelf
            self.restock_lines(&order).await?;
        } else {
            // Unpaid holds just evaporate
            self.release_reservations(&order).await?;
        }

        self.invalidate(order_id).await;
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, "order cancelled");
        Ok(order)
    }

    /// `{Delivered, Cancelled} → Refunded`: signals the payment processor,
    /// restocks committed quantities if no cancellation already did.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId) -> Result<Order, LifecycleError> {
        let current = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(LifecycleError::OrderNotFound(order_id))?;

        if !current.status.can_refund() {
            return Err(LifecycleError::Order(OrderError::InvalidTransition {
                from: current.status,
                action: "refund",
            }));
        }

        // Money first: if the processor rejects the refund the order stays
        // where it was
        if let Some(session_ref) = current.payment_session_ref.as_deref()
            && current.paid_at.is_some()
        {
            self.payment
                .refund(session_ref, current.totals().total)
                .await
                .map_err(LifecycleError::Refund)?;
        }

        let mut restock_won = false;
        let order = apply_order_transition(&self.store, order_id, |order| {
            let was_paid = order.paid_at.is_some();
            order.refund(Utc::now())?;
            if was_paid {
                restock_won = order.mark_restocked(Utc::now());
            }
            Ok(true)
        })
        .await
        .map_err(|e| map_apply_error(e, order_id))?;

        if restock_won {
            self.restock_lines(&order).await?;
        }

        self.invalidate(order_id).await;
        metrics::counter!("orders_refunded_total").increment(1);
        tracing::info!(%order_id, restocked = restock_won, "order refunded");
        Ok(order)
    }

    /// Cancels orders still `Pending` past the grace period, releasing
    /// their reservations. Returns how many orders were cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_stale_pending(
        &self,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, LifecycleError> {
        let stale = self
            .store
            .pending_orders_created_before(now - grace)
            .await?;

        let mut cancelled = 0;
        for order in stale {
            // Expired reservations were likely already swept; release is
            // idempotent either way
            if let Err(e) = self.release_reservations(&order).await {
                tracing::error!(order_id = %order.id, error = %e, "failed to release reservations for stale order");
                continue;
            }

            let result = apply_order_transition(&self.store, order.id, |order| {
                if order.status != OrderStatus::Pending {
                    return Ok(false);
                }
                order.cancel(now)?;
                Ok(true)
            })
            .await;

            match result {
                Ok(_) => {
                    cancelled += 1;
                    metrics::counter!("orders_stale_cancelled_total").increment(1);
                    self.invalidate(order.id).await;
                }
                Err(e) => {
                    let e = map_apply_error(e, order.id);
                    tracing::error!(order_id = %order.id, error = %e, "failed to cancel stale order");
                }
            }
        }

        Ok(cancelled)
    }

    async fn release_reservations(&self, order: &Order) -> Result<(), LifecycleError> {
        for reservation_id in &order.reservation_ids {
            match self.ledger.release(*reservation_id).await {
                Ok(_) => {}
                Err(InventoryError::ReservationNotFound(_)) => {
                    tracing::warn!(order_id = %order.id, %reservation_id, "reservation missing during release");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn restock_lines(&self, order: &Order) -> Result<(), LifecycleError> {
        for line in order.lines() {
            self.ledger
                .restock(&line.product_id, i64::from(line.quantity))
                .await?;
        }
        Ok(())
    }

    async fn invalidate(&self, order_id: OrderId) {
        let tags = [
            CacheTag::Orders,
            CacheTag::Order(order_id),
            CacheTag::Inventory,
        ];
        if let Err(e) = self.cache.invalidate(&tags).await {
            tracing::warn!(%order_id, error = %e, "cache invalidation failed");
        }
    }
}

fn map_apply_error(e: OrderApplyError, order_id: OrderId) -> LifecycleError {
    match e {
        OrderApplyError::NotFound(_) => LifecycleError::OrderNotFound(order_id),
        OrderApplyError::Order(e) => LifecycleError::Order(e),
        OrderApplyError::Store(e) => LifecycleError::Store(e),
    }
}

/// Periodically cancels orders stuck in `Pending` past the grace period.
///
/// Complements the reservation-expiry sweep: the reservation sweep returns
/// the stock, this sweep settles the parent order.
pub struct StalePendingSweeper<S, Pay, C> {
    lifecycle: OrderLifecycle<S, Pay, C>,
    grace: Duration,
    interval: std::time::Duration,
}

impl<S, Pay, C> StalePendingSweeper<S, Pay, C>
where
    S: OrderStore + InventoryStore + Clone,
    Pay: PaymentProcessor,
    C: CacheInvalidator,
{
    /// Creates a sweeper cancelling pending orders older than `grace`.
    pub fn new(
        lifecycle: OrderLifecycle<S, Pay, C>,
        grace: Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            lifecycle,
            grace,
            interval,
        }
    }

    /// Runs the sweep loop forever; errors are logged and the loop keeps
    /// going.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self
                .lifecycle
                .cancel_stale_pending(self.grace, Utc::now())
                .await
            {
                Ok(cancelled) if cancelled > 0 => {
                    tracing::info!(cancelled, "stale pending orders cancelled");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "stale pending sweep failed");
                }
            }
        }
    }
}
