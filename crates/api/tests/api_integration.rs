//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::Money;
use metrics_exporter_prometheus::PrometheusHandle;
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, Arc<api::AppState<InMemoryStore>>) {
    let store = InMemoryStore::new();
    let (state, _sweepers) = api::create_default_state(store, api::Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

/// Seeds a sellable product with stock.
async fn seed_product(state: &api::AppState<InMemoryStore>, sku: &str, stock: i64, cents: i64) {
    state.catalog.insert(sku, &format!("Product {sku}"), Money::from_cents(cents));
    state
        .ledger
        .adjust(
            &domain::ProductId::new(sku),
            inventory::AdjustOperation::Set,
            stock,
            Some("seed"),
        )
        .await
        .unwrap();
}

fn json_request(method: &str, uri: &str, headers: &[(&str, &str)], body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn checkout_body() -> serde_json::Value {
    serde_json::json!({
        "customer": { "email": "shopper@example.com", "name": "Pat Shopper" },
        "shipping_address": {
            "line1": "1 Main St", "city": "Springfield", "region": "CA",
            "postal_code": "90000", "country": "US"
        },
        "billing_address": {
            "line1": "1 Main St", "city": "Springfield", "region": "CA",
            "postal_code": "90000", "country": "US"
        },
        "shipping_method": "standard"
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let (app, _) = setup();

    let response = app
        .oneshot(Request::builder().uri("/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cart_add_and_get() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 10, 1000).await;
    let headers = [("x-cart-session", "guest-1")];

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &headers,
            serde_json::json!({"product_id": "SKU-001", "quantity": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/cart")
                .header("x-cart-session", "guest-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["total_quantity"], 2);
    assert_eq!(json["lines"][0]["product_id"], "SKU-001");
}

#[tokio::test]
async fn test_checkout_empty_cart_rejected() {
    let (app, _) = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/checkout",
            &[("x-cart-session", "guest-1")],
            checkout_body(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "empty_cart");
}

#[tokio::test]
async fn test_checkout_insufficient_inventory_names_product() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 1, 1000).await;
    let headers = [("x-cart-session", "guest-1")];

    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &headers,
            serde_json::json!({"product_id": "SKU-001", "quantity": 5}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request("POST", "/checkout", &headers, checkout_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "insufficient_inventory");
    assert_eq!(json["product_id"], "SKU-001");
}

#[tokio::test]
async fn test_full_purchase_flow() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 10, 1000).await;
    let headers = [("x-cart-session", "guest-1")];

    // Add to cart
    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &headers,
            serde_json::json!({"product_id": "SKU-001", "quantity": 3}),
        ))
        .await
        .unwrap();

    // Checkout
    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkout", &headers, checkout_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = json_body(response).await;
    let order_id = receipt["order_id"].as_str().unwrap().to_string();
    let session_ref = receipt["payment_session_ref"].as_str().unwrap().to_string();
    assert_eq!(receipt["subtotal_cents"], 3000);

    // Payment webhook (signed)
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/webhooks/payment",
            &[("x-webhook-signature", "dev-secret")],
            serde_json::json!({
                "event_id": "evt-1",
                "session_ref": session_ref,
                "outcome": "succeeded"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "processed");

    // The order is processing and the cart is gone
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/orders/{order_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let order = json_body(response).await;
    assert_eq!(order["status"], "processing");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cart")
                .header("x-cart-session", "guest-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let cart = json_body(response).await;
    assert_eq!(cart["total_quantity"], 0);

    // Ship, then deliver
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/orders/{order_id}/status"),
            &[],
            serde_json::json!({"status": "shipped", "tracking_number": "TRACK-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let shipped = json_body(response).await;
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["tracking_number"], "TRACK-1");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/orders/{order_id}/status"),
            &[],
            serde_json::json!({"status": "delivered"}),
        ))
        .await
        .unwrap();
    let delivered = json_body(response).await;
    assert_eq!(delivered["status"], "delivered");

    // Committed stock shows up in the admin inventory view
    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/inventory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let inventory = json_body(response).await;
    assert_eq!(inventory[0]["committed"], 3);
    assert_eq!(inventory[0]["available"], 7);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (app, _) = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/webhooks/payment",
            &[("x-webhook-signature", "wrong")],
            serde_json::json!({
                "event_id": "evt-1",
                "session_ref": "sess-1",
                "outcome": "succeeded"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_webhook_is_acknowledged() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 10, 1000).await;
    let headers = [("x-cart-session", "guest-1")];

    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &headers,
            serde_json::json!({"product_id": "SKU-001", "quantity": 1}),
        ))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkout", &headers, checkout_body()))
        .await
        .unwrap();
    let receipt = json_body(response).await;
    let session_ref = receipt["payment_session_ref"].as_str().unwrap().to_string();

    let event = serde_json::json!({
        "event_id": "evt-dup",
        "session_ref": session_ref,
        "outcome": "succeeded"
    });

    let first = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/webhooks/payment",
            &[("x-webhook-signature", "dev-secret")],
            event.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(first).await["status"], "processed");

    let second = app
        .oneshot(json_request(
            "POST",
            "/webhooks/payment",
            &[("x-webhook-signature", "dev-secret")],
            event,
        ))
        .await
        .unwrap();
    assert_eq!(json_body(second).await["status"], "duplicate");
}

#[tokio::test]
async fn test_webhook_unknown_order_acknowledged() {
    let (app, _) = setup();

    let response = app
        .oneshot(json_request(
            "POST",
            "/webhooks/payment",
            &[("x-webhook-signature", "dev-secret")],
            serde_json::json!({
                "event_id": "evt-ghost",
                "session_ref": "sess-nowhere",
                "outcome": "succeeded"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "unknown_order");
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 10, 1000).await;
    let headers = [("x-cart-session", "guest-1")];

    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &headers,
            serde_json::json!({"product_id": "SKU-001", "quantity": 1}),
        ))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/checkout", &headers, checkout_body()))
        .await
        .unwrap();
    let receipt = json_body(response).await;
    let order_id = receipt["order_id"].as_str().unwrap().to_string();

    // Shipping an unpaid (pending) order is rejected
    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/admin/orders/{order_id}/status"),
            &[],
            serde_json::json!({"status": "shipped"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "invalid_transition");
}

#[tokio::test]
async fn test_guest_cart_merge() {
    let (app, state) = setup();
    seed_product(&state, "SKU-001", 2, 1000).await;
    let customer_id = uuid::Uuid::new_v4().to_string();

    // Guest puts 2 in the cart, the signed-in user already has 1
    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &[("x-cart-session", "guest-1")],
            serde_json::json!({"product_id": "SKU-001", "quantity": 2}),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/cart/items",
            &[("x-customer-id", customer_id.as_str())],
            serde_json::json!({"product_id": "SKU-001", "quantity": 1}),
        ))
        .await
        .unwrap();

    // Merge clamps to available stock (2)
    let response = app
        .oneshot(json_request(
            "POST",
            "/cart/merge",
            &[("x-cart-session", "guest-1")],
            serde_json::json!({"customer_id": customer_id}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total_quantity"], 2);
}

#[tokio::test]
async fn test_admin_inventory_adjustment() {
    let (app, _) = setup();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/inventory/SKU-NEW",
            &[],
            serde_json::json!({"operation": "SET", "quantity": 25, "reason": "initial"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total_stock"], 25);
    assert_eq!(json["available"], 25);

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/inventory/SKU-NEW",
            &[],
            serde_json::json!({"operation": "SUBTRACT", "quantity": 5}),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["total_stock"], 20);
}
