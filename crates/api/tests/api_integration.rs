//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, Money, ProductId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{AddressRecord, InMemoryStore, ProductRecord};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");
            api::describe_metrics();
            handle
        })
        .clone()
}

fn setup() -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = Arc::new(api::AppState::new(store.clone()));
    let app = api::create_app(state, get_metrics_handle());
    (app, store)
}

async fn seed_product(store: &InMemoryStore, price_cents: i64, stock: u32) -> ProductId {
    let id = ProductId::new();
    store
        .insert_product(ProductRecord {
            id,
            price: Money::from_cents(price_cents),
            stock,
        })
        .await;
    id
}

struct Caller {
    user_id: UserId,
    admin: bool,
}

impl Caller {
    fn user() -> Self {
        Self {
            user_id: UserId::new(),
            admin: false,
        }
    }

    fn admin() -> Self {
        Self {
            user_id: UserId::new(),
            admin: true,
        }
    }
}

async fn send(
    app: &axum::Router,
    caller: Option<&Caller>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("X-User-Id", caller.user_id.to_string());
        if caller.admin {
            builder = builder.header("X-User-Role", "admin");
        }
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, None, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "api");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (app, _) = setup();

    let (status, json) = send(&app, None, "GET", "/cart", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "unauthorized");
}

#[tokio::test]
async fn test_get_cart_creates_empty_cart() {
    let (app, _) = setup();
    let caller = Caller::user();

    let (status, first) = send(&app, Some(&caller), "GET", "/cart", None).await;
    let (_, second) = send(&app, Some(&caller), "GET", "/cart", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["user_id"], caller.user_id.to_string());
    assert_eq!(first["items"], json!([]));
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn test_add_item_returns_cart_with_price_snapshot() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1250, 10).await;

    let (status, cart) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["product_id"], product.to_string());
    assert_eq!(cart["items"][0]["quantity"], 2);
    assert_eq!(cart["items"][0]["unit_price_cents"], 1250);
    assert_eq!(cart["subtotal_cents"], 2500);
}

#[tokio::test]
async fn test_add_item_errors() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 1).await;

    let (status, json) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "insufficient_stock");

    let (status, json) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": ProductId::new(), "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "product_not_found");

    let (status, json) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "validation_error");

    let (status, json) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "validation_error");
}

#[tokio::test]
async fn test_update_and_remove_cart_items() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 10).await;

    let (_, cart) = send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;
    let item_id = cart["items"][0]["id"].as_str().unwrap().to_string();
    let item_uri = format!("/cart/items/{item_id}");

    let (status, cart) = send(
        &app,
        Some(&caller),
        "PATCH",
        &item_uri,
        Some(json!({ "quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 5);

    let (status, cart) = send(
        &app,
        Some(&caller),
        "PUT",
        &item_uri,
        Some(json!({ "quantity": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 5);

    let (status, json) = send(
        &app,
        Some(&Caller::user()),
        "PATCH",
        &item_uri,
        Some(json!({ "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "cart_item_not_found");

    let (status, _) = send(&app, Some(&caller), "DELETE", &item_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, Some(&caller), "DELETE", &item_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "cart_item_not_found");
}

#[tokio::test]
async fn test_malformed_item_id_is_validation_error() {
    let (app, _) = setup();
    let caller = Caller::user();

    let (status, json) = send(&app, Some(&caller), "DELETE", "/cart/items/abc", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "validation_error");
}

#[tokio::test]
async fn test_clear_cart_is_idempotent() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 10).await;
    send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;

    let (first, _) = send(&app, Some(&caller), "DELETE", "/cart", None).await;
    let (second, _) = send(&app, Some(&caller), "DELETE", "/cart", None).await;

    assert_eq!(first, StatusCode::NO_CONTENT);
    assert_eq!(second, StatusCode::NO_CONTENT);
    assert_eq!(store.cart_count(caller.user_id).await, 0);
}

#[tokio::test]
async fn test_checkout_flow() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 3).await;
    send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 2 })),
    )
    .await;

    let (status, order) = send(&app, Some(&caller), "POST", "/orders", None).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_amount_cents"], 2000);
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["items"][0]["unit_price_cents"], 1000);
    assert_eq!(order["items"][0]["line_total_cents"], 2000);
    assert_eq!(order["shipping_address_id"], Value::Null);
    let number = order["number"].as_str().unwrap();
    assert!(number.starts_with("ORD-"));
    assert_eq!(number.len(), 12);
    assert_eq!(store.product(product).await.unwrap().stock, 1);
    assert_eq!(store.cart_count(caller.user_id).await, 0);

    let order_id = order["id"].as_str().unwrap();
    let (status, fetched) = send(
        &app,
        Some(&caller),
        "GET",
        &format!("/orders/{order_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], order["id"]);

    let (status, list) = send(&app, Some(&caller), "GET", "/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, json) = send(
        &app,
        Some(&Caller::user()),
        "GET",
        &format!("/orders/{order_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "order_not_found");
}

#[tokio::test]
async fn test_checkout_with_addresses() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 3).await;
    let address = AddressId::new();
    store
        .insert_address(AddressRecord {
            id: address,
            user_id: caller.user_id,
        })
        .await;
    send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;

    let (status, json) = send(
        &app,
        Some(&caller),
        "POST",
        "/orders",
        Some(json!({ "shipping_address_id": AddressId::new() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "address_not_found");

    let (status, order) = send(
        &app,
        Some(&caller),
        "POST",
        "/orders",
        Some(json!({ "shipping_address_id": address, "billing_address_id": address })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["shipping_address_id"], address.to_string());
    assert_eq!(order["billing_address_id"], address.to_string());
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let (app, _) = setup();
    let caller = Caller::user();

    let (status, json) = send(&app, Some(&caller), "POST", "/orders", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "empty_cart");
}

#[tokio::test]
async fn test_status_update_requires_admin() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 1000, 3).await;
    send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;
    let (_, order) = send(&app, Some(&caller), "POST", "/orders", None).await;
    let status_uri = format!("/orders/{}/status", order["id"].as_str().unwrap());

    let (status, json) = send(
        &app,
        Some(&caller),
        "PATCH",
        &status_uri,
        Some(json!({ "status": "processing" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error_code"], "insufficient_permissions");

    let admin = Caller::admin();
    let (status, json) = send(
        &app,
        Some(&admin),
        "PATCH",
        &status_uri,
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_order_status_transition");

    let (status, json) = send(
        &app,
        Some(&admin),
        "PATCH",
        &status_uri,
        Some(json!({ "status": "teleported" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "validation_error");

    let (status, json) = send(
        &app,
        Some(&admin),
        "PATCH",
        &status_uri,
        Some(json!({ "status": "processing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processing");
}

#[tokio::test]
async fn test_status_update_unknown_order() {
    let (app, _) = setup();

    let (status, json) = send(
        &app,
        Some(&Caller::admin()),
        "PATCH",
        &format!("/orders/{}/status", UserId::new()),
        Some(json!({ "status": "processing" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "order_not_found");
}

#[tokio::test]
async fn test_versioned_prefix() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 500, 5).await;

    let (status, cart) = send(
        &app,
        Some(&caller),
        "POST",
        "/api/v1/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["unit_price_cents"], 500);

    let (status, _) = send(&app, Some(&caller), "POST", "/api/v1/orders", None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, store) = setup();
    let caller = Caller::user();
    let product = seed_product(&store, 500, 5).await;
    send(
        &app,
        Some(&caller),
        "POST",
        "/cart/items",
        Some(json!({ "product_id": product, "quantity": 1 })),
    )
    .await;
    send(&app, Some(&caller), "POST", "/orders", None).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_total"));
    assert!(text.contains("cart_mutations_total"));
}
