use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Version};
use domain::{
    Cart, CartIdentity, InventoryRecord, Order, PaymentEventRecord, ProductId, Reservation,
    ReservationStatus,
};

use crate::Result;

/// Outcome of an atomic reservation status transition.
#[derive(Debug, Clone)]
pub enum ReservationTransition {
    /// This caller won the `Active → terminal` race; the returned record
    /// carries the new status.
    Applied(Reservation),
    /// Another caller got there first; the reservation is already in the
    /// given terminal status.
    AlreadyTerminal(ReservationStatus),
}

/// Store for per-product inventory counters and their reservations.
///
/// Inventory records and reservations form one consistency domain: the
/// ledger serializes per-product counter mutations through the versioned
/// `upsert_inventory` compare-and-swap, and reservation termination through
/// the atomic `try_transition_reservation`. Cross-product operations never
/// contend.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Retrieves the inventory record for a product.
    async fn get_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Retrieves all inventory records.
    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>>;

    /// Inserts or updates an inventory record with an optimistic version
    /// check.
    ///
    /// `record.version` must be the version observed at read time
    /// (`Version::initial()` for a new product). Fails with
    /// `VersionConflict` if the stored version differs; on success the
    /// record is stored with, and this returns, the next version.
    async fn upsert_inventory(&self, record: InventoryRecord) -> Result<Version>;

    /// Inserts a new (active) reservation.
    async fn insert_reservation(&self, reservation: Reservation) -> Result<()>;

    /// Retrieves a reservation by id.
    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Retrieves all reservations belonging to an order.
    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>>;

    /// Atomically moves a reservation from `Active` to the given terminal
    /// status.
    ///
    /// Exactly one caller can win this transition; later callers observe
    /// `AlreadyTerminal`. Fails with `NotFound` for an unknown id.
    async fn try_transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> Result<ReservationTransition>;

    /// Lists active reservations whose TTL elapsed before `cutoff`.
    async fn active_reservations_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Reservation>>;
}

/// Store for carts, keyed by their owning identity.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Retrieves the cart for an identity.
    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>>;

    /// Inserts or replaces the cart for its identity.
    async fn put_cart(&self, cart: &Cart) -> Result<()>;

    /// Deletes the cart for an identity. Deleting a missing cart is a
    /// no-op.
    async fn delete_cart(&self, identity: &CartIdentity) -> Result<()>;
}

/// Store for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. `order.version` must be `Version::initial()`;
    /// the stored record gets `Version::first()`.
    async fn insert_order(&self, order: &Order) -> Result<Version>;

    /// Retrieves an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Updates an order with an optimistic version check on
    /// `order.version`. Returns the new version.
    async fn update_order(&self, order: &Order) -> Result<Version>;

    /// Resolves an order by the payment session opened for it.
    async fn find_order_by_payment_session(&self, session_ref: &str) -> Result<Option<Order>>;

    /// Lists orders still pending that were created before `cutoff`.
    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>>;
}

/// Store for received payment events, keyed by the processor-assigned
/// external event id.
#[async_trait]
pub trait PaymentEventStore: Send + Sync {
    /// Inserts the event if its external id has not been seen.
    ///
    /// Returns true if this call inserted the record (the caller owns
    /// processing), false if the id already existed. This is the
    /// first-writer-wins idempotency gate.
    async fn insert_event_if_new(&self, event: &PaymentEventRecord) -> Result<bool>;

    /// Retrieves an event by its external id.
    async fn get_event(&self, external_event_id: &str) -> Result<Option<PaymentEventRecord>>;

    /// Replaces a stored event record (resolved order id, processed flag).
    async fn update_event(&self, event: &PaymentEventRecord) -> Result<()>;
}
