use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Version};
use domain::{
    Cart, CartIdentity, InventoryRecord, Order, OrderStatus, PaymentEventRecord, ProductId,
    Reservation, ReservationStatus,
};
use tokio::sync::RwLock;

use crate::store::{
    CartStore, InventoryStore, OrderStore, PaymentEventStore, ReservationTransition,
};
use crate::{Result, StoreError};

#[derive(Default)]
struct Inner {
    inventory: HashMap<ProductId, InventoryRecord>,
    reservations: HashMap<ReservationId, Reservation>,
    carts: HashMap<CartIdentity, Cart>,
    orders: HashMap<OrderId, Order>,
    payment_events: HashMap<String, PaymentEventRecord>,
}

/// In-memory implementation of all record stores.
///
/// Backs tests and local runs; provides the same trait surface as the
/// PostgreSQL implementation. All mutations to one entity family happen
/// under a single write lock, which makes the per-record version checks
/// atomic.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored reservations (any status).
    pub async fn reservation_count(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.inventory.clear();
        inner.reservations.clear();
        inner.carts.clear();
        inner.orders.clear();
        inner.payment_events.clear();
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn get_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.inner.read().await.inventory.get(product_id).cloned())
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner.inventory.values().cloned().collect();
        records.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(records)
    }

    async fn upsert_inventory(&self, mut record: InventoryRecord) -> Result<Version> {
        let mut inner = self.inner.write().await;

        let actual = inner
            .inventory
            .get(&record.product_id)
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        if actual != record.version {
            return Err(StoreError::VersionConflict {
                entity: "inventory",
                key: record.product_id.to_string(),
                expected: record.version,
                actual,
            });
        }

        record.version = record.version.next();
        let new_version = record.version;
        inner.inventory.insert(record.product_id.clone(), record);
        Ok(new_version)
    }

    async fn insert_reservation(&self, reservation: Reservation) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.reservations.contains_key(&reservation.id) {
            return Err(StoreError::Duplicate {
                entity: "reservation",
                key: reservation.id.to_string(),
            });
        }
        inner.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.inner.read().await.reservations.get(&id).cloned())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let inner = self.inner.read().await;
        let mut found: Vec<_> = inner
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(found)
    }

    async fn try_transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> Result<ReservationTransition> {
        let mut inner = self.inner.write().await;
        let reservation = inner
            .reservations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "reservation",
                key: id.to_string(),
            })?;

        if reservation.status != ReservationStatus::Active {
            return Ok(ReservationTransition::AlreadyTerminal(reservation.status));
        }

        reservation.status = to;
        Ok(ReservationTransition::Applied(reservation.clone()))
    }

    async fn active_reservations_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<_> = inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        Ok(expired)
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(identity).cloned())
    }

    async fn put_cart(&self, cart: &Cart) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.carts.insert(cart.identity.clone(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, identity: &CartIdentity) -> Result<()> {
        self.inner.write().await.carts.remove(identity);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<Version> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: order.id.to_string(),
            });
        }

        let mut stored = order.clone();
        stored.version = Version::first();
        let version = stored.version;
        inner.orders.insert(stored.id, stored);
        Ok(version)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<Version> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                key: order.id.to_string(),
            })?;

        if existing.version != order.version {
            return Err(StoreError::VersionConflict {
                entity: "order",
                key: order.id.to_string(),
                expected: order.version,
                actual: existing.version,
            });
        }

        let mut stored = order.clone();
        stored.version = stored.version.next();
        let version = stored.version;
        *existing = stored;
        Ok(version)
    }

    async fn find_order_by_payment_session(&self, session_ref: &str) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.payment_session_ref.as_deref() == Some(session_ref))
            .cloned())
    }

    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut stale: Vec<_> = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl PaymentEventStore for InMemoryStore {
    async fn insert_event_if_new(&self, event: &PaymentEventRecord) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.payment_events.contains_key(&event.external_event_id) {
            return Ok(false);
        }
        inner
            .payment_events
            .insert(event.external_event_id.clone(), event.clone());
        Ok(true)
    }

    async fn get_event(&self, external_event_id: &str) -> Result<Option<PaymentEventRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .payment_events
            .get(external_event_id)
            .cloned())
    }

    async fn update_event(&self, event: &PaymentEventRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.payment_events.get_mut(&event.external_event_id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "payment_event",
                key: event.external_event_id.clone(),
            }),
        }
    }
}
