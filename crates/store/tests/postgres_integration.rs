//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{OrderId, ReservationId, Version};
use domain::{
    Cart, CartIdentity, InventoryRecord, PaymentEventRecord, PaymentOutcome, ProductId,
    Reservation, ReservationStatus, SessionToken,
};
use sqlx::PgPool;
use store::{
    CartStore, InventoryStore, PaymentEventStore, PostgresStore, ReservationTransition, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Run the schema with raw_sql to execute multiple statements
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn store() -> PostgresStore {
    let info = get_container_info().await;
    let pool = PgPool::connect(&info.connection_string).await.unwrap();
    PostgresStore::new(pool)
}

fn unique_sku(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
#[serial_test::serial]
async fn inventory_insert_and_cas_update() {
    let store = store().await;
    let sku = unique_sku("SKU");

    let v1 = store
        .upsert_inventory(InventoryRecord::new(sku.as_str(), 10))
        .await
        .unwrap();
    assert_eq!(v1, Version::first());

    let mut current = store
        .get_inventory(&ProductId::new(sku.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert!(current.try_reserve(4));
    let v2 = store.upsert_inventory(current).await.unwrap();
    assert_eq!(v2, Version::new(2));

    let loaded = store
        .get_inventory(&ProductId::new(sku.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.reserved, 4);
    assert_eq!(loaded.available(), 6);
}

#[tokio::test]
#[serial_test::serial]
async fn inventory_stale_write_conflicts() {
    let store = store().await;
    let sku = unique_sku("SKU");

    store
        .upsert_inventory(InventoryRecord::new(sku.as_str(), 10))
        .await
        .unwrap();

    // A writer still holding the pre-insert version loses
    let stale = InventoryRecord::new(sku.as_str(), 99);
    let result = store.upsert_inventory(stale).await;
    assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
}

#[tokio::test]
#[serial_test::serial]
async fn reservation_transition_survives_and_fires_once() {
    let store = store().await;
    let now = Utc::now();
    let reservation = Reservation::new(
        ReservationId::new(),
        OrderId::new(),
        unique_sku("SKU"),
        2,
        now,
        now + Duration::minutes(15),
    );
    let id = reservation.id;

    store.insert_reservation(reservation).await.unwrap();

    // Reconnect to prove the record survived the first connection
    let store2 = self::store().await;
    let loaded = store2.get_reservation(id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReservationStatus::Active);

    let first = store2
        .try_transition_reservation(id, ReservationStatus::Committed)
        .await
        .unwrap();
    assert!(matches!(first, ReservationTransition::Applied(_)));

    let second = store2
        .try_transition_reservation(id, ReservationStatus::Released)
        .await
        .unwrap();
    assert!(matches!(
        second,
        ReservationTransition::AlreadyTerminal(ReservationStatus::Committed)
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn expired_reservations_are_listed() {
    let store = store().await;
    let now = Utc::now();

    let mut expired = Reservation::new(
        ReservationId::new(),
        OrderId::new(),
        unique_sku("SKU"),
        1,
        now - Duration::minutes(30),
        now - Duration::minutes(15),
    );
    expired.status = ReservationStatus::Active;
    let fresh = Reservation::new(
        ReservationId::new(),
        OrderId::new(),
        unique_sku("SKU"),
        1,
        now,
        now + Duration::minutes(15),
    );

    store.insert_reservation(expired.clone()).await.unwrap();
    store.insert_reservation(fresh.clone()).await.unwrap();

    let listed = store
        .active_reservations_expiring_before(now)
        .await
        .unwrap();
    assert!(listed.iter().any(|r| r.id == expired.id));
    assert!(!listed.iter().any(|r| r.id == fresh.id));
}

#[tokio::test]
#[serial_test::serial]
async fn cart_roundtrip() {
    let store = store().await;
    let identity = CartIdentity::Guest(SessionToken::new(unique_sku("guest")));
    let mut cart = Cart::new(identity.clone());
    cart.add_item(domain::LineKey::product("SKU-001"), 3).unwrap();

    store.put_cart(&cart).await.unwrap();
    let loaded = store.get_cart(&identity).await.unwrap().unwrap();
    assert_eq!(loaded.quantity(&domain::LineKey::product("SKU-001")), Some(3));

    store.delete_cart(&identity).await.unwrap();
    assert!(store.get_cart(&identity).await.unwrap().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn payment_event_gate_is_durable() {
    let store = store().await;
    let event_id = unique_sku("evt");
    let event = PaymentEventRecord::received(
        event_id.as_str(),
        unique_sku("sess"),
        PaymentOutcome::Succeeded,
        Utc::now(),
    );

    assert!(store.insert_event_if_new(&event).await.unwrap());
    assert!(!store.insert_event_if_new(&event).await.unwrap());

    let mut processed = event.clone();
    processed.processed = true;
    store.update_event(&processed).await.unwrap();

    // A new connection still sees the processed flag
    let store2 = self::store().await;
    let loaded = store2.get_event(&event_id).await.unwrap().unwrap();
    assert!(loaded.processed);
}
