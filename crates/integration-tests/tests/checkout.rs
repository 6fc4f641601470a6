//! Checkout and order lifecycle against a real database.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::StatusCode;
use bazaar_api::db::OrderRepository;
use bazaar_integration_tests::{TestApp, checkout_body, money};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sqlx::PgPool;
use tokio::task::JoinSet;

async fn stock_of(app: &TestApp, product_id: &Value) -> i64 {
    let (status, body) = app.get(&format!("/api/product/{product_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["stock"].as_i64().unwrap()
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_insufficient_stock_rejects_and_keeps_stock(pool: PgPool) {
    let app = TestApp::new(pool.clone());
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Gamcha", "sku": "GAM-1", "price": "250", "stock": 2 }))
        .await;

    let (status, body) = app
        .post("/api/checkout", None, checkout_body(&product["id"], 3))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(stock_of(&app, &product["id"]).await, 2);

    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 0);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_order_totals_add_up(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(
            &admin,
            json!({
                "name": "Nakshi Kantha",
                "sku": "NK-100",
                "price": "100",
                "stock": 10,
                "discount": { "type": "percent", "value": "10" },
            }),
        )
        .await;

    let (status, quote) = app
        .post("/api/checkout/quote", None, checkout_body(&product["id"], 2))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, placed) = app
        .post("/api/checkout", None, checkout_body(&product["id"], 2))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{placed}");
    let order = &placed["data"];

    let subtotal = money(&order["subtotal"]);
    let discount = money(&order["discount_total"]);
    let shipping = money(&order["shipping_charge"]);
    let total = money(&order["total"]);

    assert_eq!(subtotal, Decimal::from(200));
    assert_eq!(discount, Decimal::from(20));
    assert_eq!(shipping, Decimal::from(60));
    assert_eq!(total, subtotal - discount + shipping);
    assert_eq!(money(&quote["data"]["total"]), total);

    let lines: Decimal = order["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|line| money(&line["line_total"]))
        .sum();
    assert_eq!(lines, subtotal - discount);

    assert_eq!(money(&order["transaction"]["amount"]), total);
    assert_eq!(stock_of(&app, &product["id"]).await, 8);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_guest_order_is_tracked_by_token(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Tant Saree", "sku": "TNT-1", "price": "900", "stock": 5 }))
        .await;

    let (status, placed) = app
        .post("/api/checkout", None, checkout_body(&product["id"], 1))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = placed["data"]["guest_token"].as_str().unwrap().to_owned();
    let order_number = placed["data"]["order_number"].clone();

    let (status, tracked) = app.get(&format!("/api/order/track/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracked["data"]["order_number"], order_number);
    assert!(tracked["data"].get("guest_token").is_none());

    let (status, _) = app.get("/api/order/track/not-a-real-token", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_signed_in_order_has_no_guest_token(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let customer = app.customer_token("buyer@bazaar.test").await;
    let product = app
        .create_product(&admin, json!({ "name": "Fotua", "sku": "FOT-1", "price": "700", "stock": 5 }))
        .await;

    let (status, placed) = app
        .post("/api/checkout", Some(&customer), checkout_body(&product["id"], 1))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(placed["data"].get("guest_token").is_none());

    let (status, mine) = app.get("/api/order", Some(&customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"]["total"], 1);

    let order_id = placed["data"]["id"].clone();
    let other = app.customer_token("other@bazaar.test").await;
    let (status, _) = app.get(&format!("/api/order/{order_id}"), Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_cancel_restores_stock(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Panjabi", "sku": "PNJ-1", "price": "1200", "stock": 4 }))
        .await;

    let (_, placed) = app
        .post("/api/checkout", None, checkout_body(&product["id"], 3))
        .await;
    let order_id = placed["data"]["id"].clone();
    assert_eq!(stock_of(&app, &product["id"]).await, 1);

    let (status, updated) = app
        .put(
            &format!("/api/admin/order/{order_id}/status"),
            Some(&admin),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["status"], "cancelled");
    assert_eq!(stock_of(&app, &product["id"]).await, 4);

    // Cancelled is final.
    let (status, _) = app
        .put(
            &format!("/api/admin/order/{order_id}/status"),
            Some(&admin),
            json!({ "status": "processing" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(stock_of(&app, &product["id"]).await, 4);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_checkout_through_shop_needs_carried_products(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let carried = app
        .create_product(&admin, json!({ "name": "Khadi Shirt", "sku": "KHD-1", "price": "1100", "stock": 5 }))
        .await;
    let elsewhere = app
        .create_product(&admin, json!({ "name": "Silk Scarf", "sku": "SLK-1", "price": "800", "stock": 5 }))
        .await;

    let (_, shop) = app
        .post("/api/shop", Some(&admin), json!({ "name": "Gulshan Outlet" }))
        .await;
    let shop_id = shop["data"]["id"].clone();
    let (status, _) = app
        .post(
            &format!("/api/shop/{shop_id}/products"),
            Some(&admin),
            json!({ "product_ids": [carried["id"]] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut body = checkout_body(&elsewhere["id"], 1);
    body["shop_id"] = shop_id.clone();
    let (status, rejected) = app.post("/api/checkout", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{rejected}");
    assert_eq!(stock_of(&app, &elsewhere["id"]).await, 5);

    let mut body = checkout_body(&carried["id"], 1);
    body["shop_id"] = shop_id.clone();
    let (status, placed) = app.post("/api/checkout", None, body).await;
    assert_eq!(status, StatusCode::CREATED, "{placed}");
    assert_eq!(placed["data"]["shop_id"], shop_id);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_concurrent_checkouts_never_oversell(pool: PgPool) {
    let app = Arc::new(TestApp::new(pool));
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Last Kantha", "sku": "LK-1", "price": "500", "stock": 3 }))
        .await;

    let mut buyers = JoinSet::new();
    for _ in 0..8 {
        let app = Arc::clone(&app);
        let body = checkout_body(&product["id"], 1);
        buyers.spawn(async move { app.post("/api/checkout", None, body).await.0 });
    }
    let statuses = buyers.join_all().await;

    let placed = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let refused = statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count();
    assert_eq!(placed, 3, "{statuses:?}");
    assert_eq!(refused, 5, "{statuses:?}");
    assert_eq!(stock_of(&app, &product["id"]).await, 0);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_courier_booking_is_written_once(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Clay Pot", "sku": "CLY-1", "price": "300", "stock": 3 }))
        .await;
    let (_, placed) = app
        .post("/api/checkout", None, checkout_body(&product["id"], 1))
        .await;
    let token = placed["data"]["guest_token"].as_str().unwrap();

    let orders = OrderRepository::new(app.state.pool());
    let order = orders.get_by_guest_token(token).await.unwrap().unwrap();

    let booked = orders
        .set_courier_booking(order.id, 1001, "SF1001", "in_review")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booked.courier_consignment_id, Some(1001));

    let again = orders
        .set_courier_booking(order.id, 1002, "SF1002", "in_review")
        .await
        .unwrap();
    assert!(again.is_none());

    let stored = orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.courier_consignment_id, Some(1001));
    assert_eq!(stored.courier_tracking_code.as_deref(), Some("SF1001"));
}
