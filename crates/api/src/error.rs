//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Server errors are captured to
//! Sentry before the response is built, and the body always uses the
//! `{success, message, data}` envelope.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use bazaar_core::{ProductId, QuoteError};

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutError;
use crate::services::courier::CourierError;
use crate::services::orders::OrderError;
use crate::services::users::UserAdminError;
use crate::validation::FieldErrors;

/// Application-level error type for the API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Courier API call failed.
    #[error("Courier error: {0}")]
    Courier(#[from] CourierError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// One or more request fields are invalid.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// State conflict (duplicate, illegal transition).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Not enough stock to fill a checkout line.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QuoteError> for AppError {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(errors) => Self::Validation(errors),
            CheckoutError::Quote(err) => err.into(),
            CheckoutError::UnknownProducts(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                Self::BadRequest(format!("unknown products: {}", ids.join(", ")))
            }
            CheckoutError::UnknownShop => Self::BadRequest("shop does not exist".to_string()),
            CheckoutError::NotCarriedByShop(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                Self::BadRequest(format!("shop does not carry products: {}", ids.join(", ")))
            }
            CheckoutError::Repository(err) => Self::Database(err),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound => Self::NotFound("Order".to_string()),
            OrderError::TransactionNotFound => Self::NotFound("Transaction".to_string()),
            OrderError::Forbidden => Self::Forbidden(err.to_string()),
            OrderError::CourierDisabled => Self::BadRequest(err.to_string()),
            OrderError::InvalidTransition { .. }
            | OrderError::AlreadyBooked(_)
            | OrderError::NotBooked
            | OrderError::Cancelled => Self::Conflict(err.to_string()),
            OrderError::Courier(e) => Self::Courier(e),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<UserAdminError> for AppError {
    fn from(err: UserAdminError) -> Self {
        match err {
            UserAdminError::NotFound => Self::NotFound("User".to_string()),
            UserAdminError::NotCorporate => Self::BadRequest(err.to_string()),
            UserAdminError::InvalidTransition { .. } | UserAdminError::SelfDelete => {
                Self::Conflict(err.to_string())
            }
            UserAdminError::Repository(e) => Self::Database(e),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::AwaitingApproval | AuthError::AccountRejected => StatusCode::FORBIDDEN,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_)
                | AuthError::MissingCompanyName => StatusCode::BAD_REQUEST,
                AuthError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
                AuthError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Courier(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Validation(_) | Self::InsufficientStock { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Internal error details never reach clients.
    fn message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Resource not found".to_string(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Courier(_) => "Courier service error".to_string(),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid credentials".to_string(),
                AuthError::InvalidToken => "Invalid or revoked token".to_string(),
                AuthError::TokenExpired => "Token expired".to_string(),
                AuthError::AwaitingApproval => "Account is awaiting approval".to_string(),
                AuthError::AccountRejected => "Account has been rejected".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => msg.clone(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::MissingCompanyName => {
                    "Company name is required for corporate accounts".to_string()
                }
                AuthError::Repository(RepositoryError::NotFound) => "User not found".to_string(),
                AuthError::Repository(RepositoryError::Conflict(msg)) => msg.clone(),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    "Authentication error".to_string()
                }
            },
            Self::NotFound(what) => format!("{what} not found"),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::Validation(_) => "The given data was invalid".to_string(),
            Self::InsufficientStock { product_id, .. } => {
                format!("Insufficient stock for product {product_id}")
            }
            Self::RateLimited => "Too many requests".to_string(),
        }
    }

    fn data(&self) -> Value {
        match self {
            Self::Validation(errors) => json!({ "errors": errors }),
            Self::InsufficientStock {
                product_id,
                requested,
                available,
            } => json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if status == StatusCode::BAD_GATEWAY {
            tracing::warn!(error = %self, "Upstream error");
        }

        let body = json!({
            "success": false,
            "message": self.message(),
            "data": self.data(),
        });

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Add a breadcrumb for a notable action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("courier", "Booking failed", Some(&[("order_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_of(err: AppError) -> Value {
        let response = err.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Product".to_string());
        assert_eq!(err.to_string(), "Not found: Product");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Conflict("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Validation(FieldErrors::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Courier(CourierError::Parse("bad".to_string()))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_repository_errors_map_by_kind() {
        assert_eq!(
            get_status(RepositoryError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(RepositoryError::Conflict("dup".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::DataCorruption("bad".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_errors_map_by_kind() {
        assert_eq!(
            get_status(AuthError::InvalidCredentials.into()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AuthError::AwaitingApproval.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AuthError::WeakPassword("short".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_order_errors_map_by_kind() {
        assert_eq!(get_status(OrderError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(OrderError::Forbidden.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(
                OrderError::InvalidTransition {
                    from: bazaar_core::OrderStatus::Shipped,
                    to: bazaar_core::OrderStatus::Cancelled,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(OrderError::Courier(CourierError::Api {
                status: 401,
                message: "bad key".to_string(),
            })
            .into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_error_body_uses_envelope() {
        let body = body_of(AppError::Conflict("slug already exists".to_string())).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "slug already exists");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let body = body_of(AppError::Internal("pool exhausted at 10.0.0.3".to_string())).await;
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_insufficient_stock_carries_quantities() {
        let err: AppError = QuoteError::InsufficientStock {
            product_id: ProductId::new(4),
            requested: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = body_of(err).await;
        assert_eq!(body["data"]["product_id"], 4);
        assert_eq!(body["data"]["requested"], 3);
        assert_eq!(body["data"]["available"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors_in_data() {
        let mut errors = FieldErrors::new();
        errors.add("phone", "phone is invalid");
        let body = body_of(AppError::Validation(errors)).await;
        assert_eq!(body["data"]["errors"]["phone"][0], "phone is invalid");
    }
}
