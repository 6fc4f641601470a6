//! Integration tests for Bazaar.
//!
//! The tests drive the real router in-process against a throwaway database
//! created by `#[sqlx::test]`, so no server has to be running.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database
//! task db:start
//!
//! # Run integration tests (they are ignored by default)
//! DATABASE_URL=postgres://localhost/bazaar_test \
//!     cargo test -p bazaar-integration-tests -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::{IpAddr, Ipv4Addr};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;

use bazaar_api::config::{ApiConfig, LogFormat, ShippingConfig};
use bazaar_api::services::auth::AuthService;
use bazaar_api::state::AppState;

/// Largest response body the helpers will buffer.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Configuration for in-process tests: no courier, no CORS, default shipping.
#[must_use]
pub fn test_config() -> ApiConfig {
    ApiConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        token_ttl_days: 30,
        cors_origins: Vec::new(),
        shipping: ShippingConfig::default(),
        courier: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
        log_format: LogFormat::Text,
    }
}

/// The application router bound to a test database.
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let state = AppState::new(test_config(), pool).unwrap();
        let router = bazaar_api::app(state.clone());
        Self { state, router }
    }

    /// Send a request and decode the JSON envelope.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            // Rate limiting keys on the client address.
            .header("x-forwarded-for", "198.51.100.1");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    /// Create a staff account and return a bearer token for it.
    pub async fn admin_token(&self) -> String {
        let auth = AuthService::new(self.state.pool(), 30);
        let admin = auth
            .create_admin("Staff", "staff@bazaar.test", "staff-password-1")
            .await
            .unwrap();
        auth.issue_token(&admin, "tests").await.unwrap().token
    }

    /// Create a product through the API and return its `data` object.
    pub async fn create_product(&self, admin: &str, body: Value) -> Value {
        let (status, json) = self.post("/api/product", Some(admin), body).await;
        assert_eq!(status, StatusCode::CREATED, "create product failed: {json}");
        json["data"].clone()
    }

    /// Register a customer and return their bearer token.
    pub async fn customer_token(&self, email: &str) -> String {
        let (status, json) = self
            .post(
                "/api/auth/register",
                None,
                json!({ "name": "Rahim", "email": email, "password": "customer-pass-1" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {json}");
        json["data"]["token"]["token"].as_str().unwrap().to_owned()
    }
}

/// A checkout body for one line, shipped inside the city.
#[must_use]
pub fn checkout_body(product_id: &Value, quantity: i32) -> Value {
    json!({
        "items": [{ "product_id": product_id, "quantity": quantity }],
        "name": "Karim Uddin",
        "phone": "+880 1711-000000",
        "address": "House 1, Road 2, Dhanmondi",
        "city": "Dhaka",
        "shipping_zone": "inside_city",
    })
}

/// Read a money field that may be serialized as a string or a number.
#[must_use]
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.to_string().parse().unwrap(),
        other => panic!("not a money value: {other}"),
    }
}
