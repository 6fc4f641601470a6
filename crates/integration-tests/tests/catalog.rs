//! Catalog endpoints against a real database.
//!
//! Requires `DATABASE_URL` pointing at a `PostgreSQL` server; each test gets
//! its own database with migrations applied.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use bazaar_integration_tests::{TestApp, money};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

#[tokio::test]
async fn test_health_without_database_round_trip() {
    let pool = PgPool::connect_lazy("postgres://unused@localhost/unused").unwrap();
    let app = TestApp::new(pool);

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_product_create_persists_fields(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;

    let (status, category) = app
        .post("/api/category", Some(&admin), json!({ "name": "Sarees" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let category_id = category["data"]["id"].clone();
    assert_eq!(category["data"]["slug"], "sarees");

    let product = app
        .create_product(
            &admin,
            json!({
                "name": "Cotton Saree",
                "sku": "sar-001",
                "category_id": category_id,
                "price": "1500.00",
                "stock": 12,
                "discount": { "type": "percent", "value": "10" },
            }),
        )
        .await;
    assert_eq!(product["sku"], "SAR-001");
    assert_eq!(product["slug"], "cotton-saree");

    let (status, fetched) = app.get("/api/product/cotton-saree", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &fetched["data"];
    assert_eq!(data["id"], product["id"]);
    assert_eq!(data["category_id"], category_id);
    assert_eq!(data["stock"], 12);
    assert_eq!(money(&data["price"]), Decimal::from(1500));
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_duplicate_sku_conflicts(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;

    app.create_product(&admin, json!({ "name": "Lungi", "sku": "LNG-1", "price": "450" }))
        .await;
    let (status, body) = app
        .post(
            "/api/product",
            Some(&admin),
            json!({ "name": "Lungi Check", "sku": "lng-1", "price": "500" }),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_catalog_writes_require_admin(pool: PgPool) {
    let app = TestApp::new(pool);
    let customer = app.customer_token("shopper@bazaar.test").await;

    let (status, _) = app
        .post("/api/category", None, json!({ "name": "Shoes" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/category", Some(&customer), json!({ "name": "Shoes" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_category_tree_reflects_writes(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;

    let (_, clothing) = app
        .post("/api/category", Some(&admin), json!({ "name": "Clothing" }))
        .await;
    let (status, tree) = app.get("/api/category/tree", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["data"].as_array().unwrap().len(), 1);

    // The cached tree is dropped when a category is added.
    app.post(
        "/api/category",
        Some(&admin),
        json!({ "name": "Panjabi", "parent_id": clothing["data"]["id"] }),
    )
    .await;
    let (_, tree) = app.get("/api/category/tree", None).await;
    let children = tree["data"][0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["slug"], "panjabi");
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_category_cannot_move_under_descendant(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;

    let (_, clothing) = app
        .post("/api/category", Some(&admin), json!({ "name": "Clothing" }))
        .await;
    let clothing_id = clothing["data"]["id"].clone();
    let (_, sarees) = app
        .post(
            "/api/category",
            Some(&admin),
            json!({ "name": "Sarees", "parent_id": clothing_id }),
        )
        .await;
    let sarees_id = sarees["data"]["id"].clone();

    let (status, body) = app
        .put(
            &format!("/api/category/{clothing_id}"),
            Some(&admin),
            json!({ "parent_id": sarees_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(
        body["data"]["errors"]["parent_id"][0],
        "a category cannot be moved under itself or its descendants"
    );

    let (status, _) = app
        .put(
            &format!("/api/category/{clothing_id}"),
            Some(&admin),
            json!({ "parent_id": clothing_id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Moving the child to the top level is fine.
    let (status, moved) = app
        .put(
            &format!("/api/category/{sarees_id}"),
            Some(&admin),
            json!({ "parent_id": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{moved}");
    assert!(moved["data"]["parent_id"].is_null());
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_stock_adjustment_past_column_limit_conflicts(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(
            &admin,
            json!({ "name": "Bulk Rice", "sku": "RICE-1", "price": "80", "stock": 2_147_483_000 }),
        )
        .await;
    let uri = format!("/api/product/{}/stock", product["id"]);

    let (status, body) = app.post(&uri, Some(&admin), json!({ "delta": 1000 })).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = app
        .post(&uri, Some(&admin), json!({ "delta": -2_147_483_001_i64 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = app.post(&uri, Some(&admin), json!({ "delta": 600 })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["stock"], 2_147_483_600_i64);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_huge_page_number_returns_empty_page(pool: PgPool) {
    let app = TestApp::new(pool);

    let (status, body) = app
        .get("/api/product?page=9223372036854775807", None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["items"], json!([]));
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_shop_product_attach_sync_detach(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let jamdani = app
        .create_product(&admin, json!({ "name": "Jamdani", "sku": "JAM-1", "price": "3000", "stock": 4 }))
        .await;
    let muslin = app
        .create_product(&admin, json!({ "name": "Muslin", "sku": "MUS-1", "price": "5000", "stock": 2 }))
        .await;

    let (status, shop) = app
        .post("/api/shop", Some(&admin), json!({ "name": "Dhanmondi Outlet" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{shop}");
    let products_uri = format!("/api/shop/{}/products", shop["data"]["id"]);

    let (status, _) = app
        .post(&products_uri, Some(&admin), json!({ "product_ids": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, attached) = app
        .post(
            &products_uri,
            Some(&admin),
            json!({ "product_ids": [jamdani["id"], muslin["id"]] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{attached}");
    assert_eq!(attached["data"]["attached"], 2);

    let (_, listed) = app.get(&products_uri, None).await;
    assert_eq!(listed["data"]["total"], 2);

    // Sync replaces the whole set.
    let (status, _) = app
        .put(&products_uri, Some(&admin), json!({ "product_ids": [muslin["id"]] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = app.get(&products_uri, None).await;
    assert_eq!(listed["data"]["total"], 1);
    assert_eq!(listed["data"]["items"][0]["id"], muslin["id"]);

    let detach_uri = format!("{products_uri}/{}", muslin["id"]);
    let (status, _) = app
        .request(Method::DELETE, &detach_uri, Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, listed) = app.get(&products_uri, None).await;
    assert_eq!(listed["data"]["total"], 0);

    let (status, _) = app
        .request(Method::DELETE, &detach_uri, Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_reviews_one_per_customer_with_summary(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let product = app
        .create_product(&admin, json!({ "name": "Shital Pati", "sku": "PAT-1", "price": "1200" }))
        .await;
    let reviews_uri = format!("/api/product/{}/reviews", product["id"]);
    let first = app.customer_token("first@bazaar.test").await;
    let second = app.customer_token("second@bazaar.test").await;

    let (status, _) = app
        .post(&reviews_uri, None, json!({ "rating": 5, "comment": "Cool to sleep on" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post(&reviews_uri, Some(&first), json!({ "rating": 5, "comment": "Cool to sleep on" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = app
        .post(&reviews_uri, Some(&first), json!({ "rating": 3 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(&reviews_uri, Some(&second), json!({ "rating": 6 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["errors"]["rating"][0], "rating must be between 1 and 5");

    let (status, _) = app
        .post(&reviews_uri, Some(&second), json!({ "rating": 4 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = app.get(&reviews_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"]["total"], 2);
    assert_eq!(listed["data"]["summary"]["count"], 2);
    assert_eq!(
        money(&listed["data"]["summary"]["average"]),
        Decimal::new(450, 2)
    );
}
