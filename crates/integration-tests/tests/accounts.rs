//! Registration, tokens and corporate approval against a real database.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use bazaar_integration_tests::TestApp;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_corporate_account_needs_approval(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;
    let credentials = json!({ "email": "buyer@acme.test", "password": "corporate-pass-1" });

    let (status, registered) = app
        .post(
            "/api/auth/register",
            None,
            json!({
                "name": "Acme Buyer",
                "email": "buyer@acme.test",
                "password": "corporate-pass-1",
                "account_type": "corporate",
                "company_name": "Acme Traders",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(registered["data"].get("token").is_none());
    let user_id = registered["data"]["user"]["id"].clone();

    let (status, _) = app.post("/api/auth/login", None, credentials.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, pending) = app.get("/api/admin/corporate", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["data"]["total"], 1);

    let (status, approved) = app
        .post(
            &format!("/api/admin/corporate/{user_id}/approve"),
            Some(&admin),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");

    let (status, login) = app.post("/api/auth/login", None, credentials).await;
    assert_eq!(status, StatusCode::OK);
    assert!(login["data"]["token"]["token"].is_string());
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_logout_revokes_token(pool: PgPool) {
    let app = TestApp::new(pool);
    let token = app.customer_token("rahim@bazaar.test").await;

    let (status, me) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["email"], "rahim@bazaar.test");

    let (status, _) = app.post("/api/auth/logout", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_duplicate_email_conflicts(pool: PgPool) {
    let app = TestApp::new(pool);
    app.customer_token("same@bazaar.test").await;

    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "name": "Again", "email": "SAME@bazaar.test", "password": "another-pass-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[sqlx::test(migrations = "../api/migrations")]
#[ignore = "Requires PostgreSQL"]
async fn test_admin_cannot_delete_self(pool: PgPool) {
    let app = TestApp::new(pool);
    let admin = app.admin_token().await;

    let (_, me) = app.get("/api/auth/me", Some(&admin)).await;
    let admin_id = me["data"]["id"].clone();

    let (status, _) = app
        .request(
            axum::http::Method::DELETE,
            &format!("/api/admin/user/{admin_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
