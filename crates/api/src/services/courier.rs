//! Steadfast courier API client.
//!
//! Books parcels (`POST /create_order`) and looks up delivery status by
//! consignment ID, invoice or tracking code. Calls are made once; failures
//! are returned to the caller, which decides whether they matter.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::CourierConfig;

/// Request timeout for every courier call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when interacting with the courier API.
#[derive(Debug, Error)]
pub enum CourierError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be configured.
    #[error("Invalid courier configuration: {0}")]
    Config(String),
}

/// A parcel to book.
#[derive(Debug, Clone, Serialize)]
pub struct ConsignmentRequest<'a> {
    /// Our reference for the parcel; the order number.
    pub invoice: &'a str,
    pub recipient_name: &'a str,
    pub recipient_phone: &'a str,
    pub recipient_address: &'a str,
    /// Amount the rider collects; zero for prepaid orders.
    #[serde(with = "rust_decimal::serde::float")]
    pub cod_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'a str>,
}

/// A booked parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consignment {
    pub consignment_id: i64,
    pub invoice: String,
    pub tracking_code: String,
    pub status: String,
}

/// How to identify a parcel in a status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Consignment,
    Invoice,
    Tracking,
}

impl LookupKind {
    const fn path(self) -> &'static str {
        match self {
            Self::Consignment => "status_by_cid",
            Self::Invoice => "status_by_invoice",
            Self::Tracking => "status_by_trackingcode",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    status: u16,
    #[serde(default)]
    message: Option<String>,
    consignment: Option<Consignment>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: u16,
    #[serde(default)]
    message: Option<String>,
    delivery_status: Option<String>,
}

/// Steadfast courier API client.
#[derive(Clone)]
pub struct SteadfastClient {
    client: reqwest::Client,
    base_url: String,
}

impl SteadfastClient {
    /// Create a new courier API client.
    ///
    /// # Errors
    ///
    /// Returns error if a credential is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &CourierConfig) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "Api-Key",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| CourierError::Config(format!("Invalid API key format: {e}")))?,
        );
        headers.insert(
            "Secret-Key",
            HeaderValue::from_str(config.secret_key.expose_secret())
                .map_err(|e| CourierError::Config(format!("Invalid secret key format: {e}")))?,
        );
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Book a parcel.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the API rejects the parcel, or the
    /// response has no consignment.
    #[instrument(skip(self, request), fields(invoice = %request.invoice))]
    pub async fn create_order(
        &self,
        request: &ConsignmentRequest<'_>,
    ) -> Result<Consignment, CourierError> {
        let url = format!("{}/create_order", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CourierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Parse(e.to_string()))?;

        if body.status != 200 {
            return Err(CourierError::Api {
                status: body.status,
                message: body.message.unwrap_or_default(),
            });
        }

        let consignment = body
            .consignment
            .ok_or_else(|| CourierError::Parse("response has no consignment".to_owned()))?;
        tracing::info!(
            consignment_id = consignment.consignment_id,
            tracking_code = %consignment.tracking_code,
            "Courier consignment created"
        );
        Ok(consignment)
    }

    /// Delivery status of a parcel.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API reports an error.
    #[instrument(skip(self))]
    pub async fn delivery_status(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<String, CourierError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            kind.path(),
            urlencoding::encode(value)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CourierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Parse(e.to_string()))?;

        if body.status != 200 {
            return Err(CourierError::Api {
                status: body.status,
                message: body.message.unwrap_or_default(),
            });
        }

        body.delivery_status
            .ok_or_else(|| CourierError::Parse("response has no delivery_status".to_owned()))
    }

    /// Status by consignment ID.
    ///
    /// # Errors
    ///
    /// See [`SteadfastClient::delivery_status`].
    pub async fn status_by_consignment_id(&self, id: i64) -> Result<String, CourierError> {
        self.delivery_status(LookupKind::Consignment, &id.to_string())
            .await
    }

    /// Status by invoice (our order number).
    ///
    /// # Errors
    ///
    /// See [`SteadfastClient::delivery_status`].
    pub async fn status_by_invoice(&self, invoice: &str) -> Result<String, CourierError> {
        self.delivery_status(LookupKind::Invoice, invoice).await
    }

    /// Status by tracking code.
    ///
    /// # Errors
    ///
    /// See [`SteadfastClient::delivery_status`].
    pub async fn status_by_tracking_code(&self, code: &str) -> Result<String, CourierError> {
        self.delivery_status(LookupKind::Tracking, code).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};

    use super::*;

    const API_KEY: &str = "k3Jd9sLq0Pz7XwV2mN5bR8tY";
    const SECRET_KEY: &str = "Zq8Wm3Rt6Yp1Lk4Hn7Vb2Xc5";

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("api-key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
            && headers.get("secret-key").and_then(|v| v.to_str().ok()) == Some(SECRET_KEY)
    }

    async fn create_order(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": 401, "message": "Unauthorized" })),
            );
        }
        if body["recipient_phone"] == "000" {
            return (
                StatusCode::OK,
                Json(json!({ "status": 400, "message": "Invalid phone" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "status": 200,
                "message": "Consignment has been created successfully.",
                "consignment": {
                    "consignment_id": 1_424_107,
                    "invoice": body["invoice"],
                    "tracking_code": "15BAEB8A",
                    "recipient_name": body["recipient_name"],
                    "cod_amount": body["cod_amount"],
                    "status": "in_review",
                }
            })),
        )
    }

    async fn status(Path(value): Path<String>) -> (StatusCode, Json<Value>) {
        if value == "missing" {
            return (StatusCode::NOT_FOUND, Json(json!({ "status": 404 })));
        }
        (
            StatusCode::OK,
            Json(json!({ "status": 200, "delivery_status": format!("delivered:{value}") })),
        )
    }

    /// Serve a fake courier API on an ephemeral port and return its base URL.
    async fn stub_server() -> String {
        let app = Router::new()
            .route("/api/v1/create_order", post(create_order))
            .route("/api/v1/status_by_cid/{value}", get(status))
            .route("/api/v1/status_by_invoice/{value}", get(status))
            .route("/api/v1/status_by_trackingcode/{value}", get(status));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    fn client(base_url: &str, api_key: &str) -> SteadfastClient {
        SteadfastClient::new(&CourierConfig {
            base_url: base_url.to_owned(),
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(SECRET_KEY),
        })
        .unwrap()
    }

    fn request(phone: &str) -> ConsignmentRequest<'_> {
        ConsignmentRequest {
            invoice: "ORD-250301-ABCDEFGH",
            recipient_name: "Rahim",
            recipient_phone: phone,
            recipient_address: "House 1, Road 2, Dhaka",
            cod_amount: Decimal::new(106_000, 2),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_create_order_returns_consignment() {
        let base = stub_server().await;
        let consignment = client(&base, API_KEY)
            .create_order(&request("01711000000"))
            .await
            .unwrap();

        assert_eq!(consignment.consignment_id, 1_424_107);
        assert_eq!(consignment.invoice, "ORD-250301-ABCDEFGH");
        assert_eq!(consignment.tracking_code, "15BAEB8A");
        assert_eq!(consignment.status, "in_review");
    }

    #[tokio::test]
    async fn test_create_order_http_error() {
        let base = stub_server().await;
        let err = client(&base, "Wrong0Key1With2Entropy3")
            .create_order(&request("01711000000"))
            .await
            .unwrap_err();

        assert!(matches!(err, CourierError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_create_order_body_status_error() {
        let base = stub_server().await;
        let err = client(&base, API_KEY)
            .create_order(&request("000"))
            .await
            .unwrap_err();

        match err {
            CourierError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid phone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_lookups_use_kind_paths() {
        let base = stub_server().await;
        let client = client(&base, API_KEY);

        assert_eq!(
            client.status_by_consignment_id(42).await.unwrap(),
            "delivered:42"
        );
        assert_eq!(
            client.status_by_invoice("ORD-1").await.unwrap(),
            "delivered:ORD-1"
        );
        assert_eq!(
            client.status_by_tracking_code("15BAEB8A").await.unwrap(),
            "delivered:15BAEB8A"
        );
    }

    #[tokio::test]
    async fn test_status_not_found() {
        let base = stub_server().await;
        let err = client(&base, API_KEY)
            .status_by_tracking_code("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let err = client("http://127.0.0.1:9", API_KEY)
            .status_by_invoice("ORD-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Http(_)));
    }
}
