//! Account and token route handlers.

use axum::{
    Router,
    extract::State,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::Result;
use crate::extract::ApiJson;
use crate::middleware::{RequireAuth, auth_rate_limiter};
use crate::models::User;
use crate::response::ApiResponse;
use crate::services::auth::{AccountType, AuthService, IssuedToken, Registration};
use crate::state::AppState;
use crate::validation::{FieldErrors, required_text};

/// Build the `/auth` router. Credential endpoints are rate limited.
pub fn router() -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(limited)
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/me/notifications", put(update_notifications))
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub account_type: AccountType,
    pub company_name: Option<String>,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub device_name: Option<String>,
}

/// A user and, when signed in, their new token.
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<IssuedToken>,
}

/// Create an account.
///
/// # Errors
///
/// Returns 400 for invalid fields, 409 if the email is taken.
#[instrument(skip_all, fields(account_type = ?body.account_type))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<ApiResponse<AuthPayload>> {
    let mut errors = FieldErrors::new();
    let name = required_text(&mut errors, "name", &body.name);
    errors.check(body.email.trim().is_empty(), "email", "email is required");
    errors.check(body.password.is_empty(), "password", "password is required");
    errors.into_result()?;

    let auth = AuthService::new(state.pool(), state.config().token_ttl_days);
    let (user, token) = auth
        .register(&Registration {
            name: &name,
            email: &body.email,
            password: &body.password,
            phone: body.phone.as_deref(),
            account_type: body.account_type,
            company_name: body.company_name.as_deref(),
        })
        .await?;

    let message = if token.is_some() {
        "Registration successful"
    } else {
        "Registration received, your account is awaiting approval"
    };
    Ok(ApiResponse::created(message, AuthPayload { user, token }))
}

/// Exchange credentials for a bearer token.
///
/// # Errors
///
/// Returns 401 for bad credentials, 403 for unapproved corporate accounts.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<ApiResponse<AuthPayload>> {
    let auth = AuthService::new(state.pool(), state.config().token_ttl_days);
    let (user, token) = auth
        .login(&body.email, &body.password, body.device_name.as_deref())
        .await?;

    Ok(ApiResponse::ok(
        "Login successful",
        AuthPayload {
            user,
            token: Some(token),
        },
    ))
}

/// Revoke the presented token.
///
/// # Errors
///
/// Returns 401 without a valid token.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn logout(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<ApiResponse<()>> {
    AuthService::new(state.pool(), state.config().token_ttl_days)
        .logout(current.token_id)
        .await?;
    state.forget_tokens(&[current.token_id]).await;

    tracing::info!("User logged out");
    Ok(ApiResponse::message("Logged out"))
}

/// The signed-in user.
///
/// # Errors
///
/// Returns 401 without a valid token.
pub async fn me(RequireAuth(current): RequireAuth) -> Result<ApiResponse<User>> {
    Ok(ApiResponse::ok("Current user", current.user))
}

/// Replace notification preferences with a `{ "channel": bool }` object.
///
/// # Errors
///
/// Returns 400 if the body is not an object of booleans.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn update_notifications(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(preferences): ApiJson<Value>,
) -> Result<ApiResponse<User>> {
    validate_preferences(&preferences)?;

    let user = UserRepository::new(state.pool())
        .update_notification_preferences(current.user.id, &preferences)
        .await?;
    state.forget_tokens(&[current.token_id]).await;

    Ok(ApiResponse::ok("Notification preferences updated", user))
}

fn validate_preferences(preferences: &Value) -> std::result::Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    match preferences.as_object() {
        Some(map) => {
            for (channel, value) in map {
                errors.check(!value.is_boolean(), channel, "must be true or false");
            }
        }
        None => errors.add("preferences", "preferences must be a JSON object"),
    }
    errors.into_result()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_preferences_must_be_boolean_map() {
        assert!(validate_preferences(&json!({ "email": true, "sms": false })).is_ok());
        assert!(validate_preferences(&json!({})).is_ok());

        let errors = validate_preferences(&json!({ "email": "yes" })).unwrap_err();
        assert!(errors.get("email").is_some());

        assert!(validate_preferences(&json!([true])).is_err());
    }
}
