use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Version};
use domain::{
    Cart, CartIdentity, InventoryRecord, Order, PaymentEventRecord, PaymentOutcome, ProductId,
    Reservation, ReservationStatus,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{
    CartStore, InventoryStore, OrderStore, PaymentEventStore, ReservationTransition,
};
use crate::{Result, StoreError};

/// PostgreSQL-backed implementation of all record stores.
///
/// One table per entity family (see `migrations/`). Orders and carts are
/// stored as JSON documents with the columns needed for lookups and the
/// optimistic version check extracted alongside.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_inventory(row: PgRow) -> Result<InventoryRecord> {
        Ok(InventoryRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            total_stock: row.try_get("total_stock")?,
            reserved: row.try_get("reserved")?,
            committed: row.try_get("committed")?,
            version: Version::new(row.try_get("version")?),
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: row.try_get("quantity")?,
            status: reservation_status_from_str(&status)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let data: serde_json::Value = row.try_get("data")?;
        let order: Order = serde_json::from_value(data)?;
        Ok(order)
    }

    fn row_to_event(row: PgRow) -> Result<PaymentEventRecord> {
        let outcome: String = row.try_get("outcome")?;
        Ok(PaymentEventRecord {
            external_event_id: row.try_get("external_event_id")?,
            session_ref: row.try_get("session_ref")?,
            outcome: payment_outcome_from_str(&outcome)?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            received_at: row.try_get("received_at")?,
            processed: row.try_get("processed")?,
        })
    }
}

fn reservation_status_from_str(s: &str) -> Result<ReservationStatus> {
    match s {
        "active" => Ok(ReservationStatus::Active),
        "committed" => Ok(ReservationStatus::Committed),
        "released" => Ok(ReservationStatus::Released),
        other => Err(StoreError::Serialization(serde_json::Error::io(
            std::io::Error::other(format!("unknown reservation status: {other}")),
        ))),
    }
}

fn payment_outcome_from_str(s: &str) -> Result<PaymentOutcome> {
    match s {
        "succeeded" => Ok(PaymentOutcome::Succeeded),
        "failed" => Ok(PaymentOutcome::Failed),
        "expired" => Ok(PaymentOutcome::Expired),
        other => Err(StoreError::Serialization(serde_json::Error::io(
            std::io::Error::other(format!("unknown payment outcome: {other}")),
        ))),
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn get_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(
            "SELECT product_id, total_stock, reserved, committed, version \
             FROM inventory WHERE product_id = $1",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_inventory).transpose()
    }

    async fn list_inventory(&self) -> Result<Vec<InventoryRecord>> {
        let rows = sqlx::query(
            "SELECT product_id, total_stock, reserved, committed, version \
             FROM inventory ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_inventory).collect()
    }

    async fn upsert_inventory(&self, record: InventoryRecord) -> Result<Version> {
        let next = record.version.next();

        let rows_affected = if record.version == Version::initial() {
            sqlx::query(
                "INSERT INTO inventory (product_id, total_stock, reserved, committed, version) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (product_id) DO NOTHING",
            )
            .bind(record.product_id.as_str())
            .bind(record.total_stock)
            .bind(record.reserved)
            .bind(record.committed)
            .bind(next.as_i64())
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE inventory \
                 SET total_stock = $2, reserved = $3, committed = $4, version = $5 \
                 WHERE product_id = $1 AND version = $6",
            )
            .bind(record.product_id.as_str())
            .bind(record.total_stock)
            .bind(record.reserved)
            .bind(record.committed)
            .bind(next.as_i64())
            .bind(record.version.as_i64())
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM inventory WHERE product_id = $1")
                    .bind(record.product_id.as_str())
                    .fetch_optional(&self.pool)
                    .await?;

            return Err(StoreError::VersionConflict {
                entity: "inventory",
                key: record.product_id.to_string(),
                expected: record.version,
                actual: Version::new(actual.unwrap_or(0)),
            });
        }

        Ok(next)
    }

    async fn insert_reservation(&self, reservation: Reservation) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO reservations \
             (id, order_id, product_id, quantity, status, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(reservation.quantity)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                entity: "reservation",
                key: reservation.id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            "SELECT id, order_id, product_id, quantity, status, created_at, expires_at \
             FROM reservations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, quantity, status, created_at, expires_at \
             FROM reservations WHERE order_id = $1 ORDER BY product_id",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn try_transition_reservation(
        &self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> Result<ReservationTransition> {
        let row = sqlx::query(
            "UPDATE reservations SET status = $2 \
             WHERE id = $1 AND status = 'active' \
             RETURNING id, order_id, product_id, quantity, status, created_at, expires_at",
        )
        .bind(id.as_uuid())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(ReservationTransition::Applied(Self::row_to_reservation(
                row,
            )?));
        }

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match status {
            Some(s) => Ok(ReservationTransition::AlreadyTerminal(
                reservation_status_from_str(&s)?,
            )),
            None => Err(StoreError::NotFound {
                entity: "reservation",
                key: id.to_string(),
            }),
        }
    }

    async fn active_reservations_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            "SELECT id, order_id, product_id, quantity, status, created_at, expires_at \
             FROM reservations \
             WHERE status = 'active' AND expires_at < $1 \
             ORDER BY expires_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT data FROM carts WHERE identity = $1")
            .bind(identity.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.try_get("data")?;
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn put_cart(&self, cart: &Cart) -> Result<()> {
        let data = serde_json::to_value(cart)?;
        sqlx::query(
            "INSERT INTO carts (identity, data, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (identity) DO UPDATE SET data = $2, updated_at = $3",
        )
        .bind(cart.identity.to_string())
        .bind(data)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cart(&self, identity: &CartIdentity) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE identity = $1")
            .bind(identity.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &Order) -> Result<Version> {
        let mut stored = order.clone();
        stored.version = Version::first();
        let data = serde_json::to_value(&stored)?;

        let result = sqlx::query(
            "INSERT INTO orders (id, status, payment_session_ref, created_at, version, data) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(stored.id.as_uuid())
        .bind(stored.status.as_str())
        .bind(stored.payment_session_ref.as_deref())
        .bind(stored.created_at)
        .bind(stored.version.as_i64())
        .bind(data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: stored.id.to_string(),
            });
        }
        Ok(stored.version)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order(&self, order: &Order) -> Result<Version> {
        let mut stored = order.clone();
        stored.version = stored.version.next();
        let data = serde_json::to_value(&stored)?;

        let result = sqlx::query(
            "UPDATE orders \
             SET status = $2, payment_session_ref = $3, version = $4, data = $5 \
             WHERE id = $1 AND version = $6",
        )
        .bind(stored.id.as_uuid())
        .bind(stored.status.as_str())
        .bind(stored.payment_session_ref.as_deref())
        .bind(stored.version.as_i64())
        .bind(data)
        .bind(order.version.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

            return match actual {
                Some(actual) => Err(StoreError::VersionConflict {
                    entity: "order",
                    key: order.id.to_string(),
                    expected: order.version,
                    actual: Version::new(actual),
                }),
                None => Err(StoreError::NotFound {
                    entity: "order",
                    key: order.id.to_string(),
                }),
            };
        }

        Ok(stored.version)
    }

    async fn find_order_by_payment_session(&self, session_ref: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE payment_session_ref = $1")
            .bind(session_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn pending_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT data FROM orders \
             WHERE status = 'pending' AND created_at < $1 \
             ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl PaymentEventStore for PostgresStore {
    async fn insert_event_if_new(&self, event: &PaymentEventRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO payment_events \
             (external_event_id, session_ref, outcome, order_id, received_at, processed) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (external_event_id) DO NOTHING",
        )
        .bind(&event.external_event_id)
        .bind(&event.session_ref)
        .bind(event.outcome.as_str())
        .bind(event.order_id.map(|id| id.as_uuid()))
        .bind(event.received_at)
        .bind(event.processed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_event(&self, external_event_id: &str) -> Result<Option<PaymentEventRecord>> {
        let row = sqlx::query(
            "SELECT external_event_id, session_ref, outcome, order_id, received_at, processed \
             FROM payment_events WHERE external_event_id = $1",
        )
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn update_event(&self, event: &PaymentEventRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_events SET order_id = $2, processed = $3 \
             WHERE external_event_id = $1",
        )
        .bind(&event.external_event_id)
        .bind(event.order_id.map(|id| id.as_uuid()))
        .bind(event.processed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "payment_event",
                key: event.external_event_id.clone(),
            });
        }
        Ok(())
    }
}
