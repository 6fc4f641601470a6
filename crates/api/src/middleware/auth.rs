//! Bearer token authentication extractors.
//!
//! Clients send `Authorization: Bearer {id}|{secret}`. Resolved tokens are
//! cached in [`AppState`] for a minute; logout and account deletion drop the
//! cache entries so revocation takes effect immediately.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use bazaar_core::PlainToken;

use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, AuthService};
use crate::state::{AppState, CachedToken};

/// Extractor that requires a valid bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireAuth(current): RequireAuth) -> Json<User> {
///     Json(current.user)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Extractor that resolves the user when a token is sent.
///
/// A request without an `Authorization` header is a guest. A request with a
/// bad token is still rejected so clients notice they were signed out.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(authenticate(parts, state).await?))
    }
}

/// Extractor that requires a staff account.
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(current) = RequireAuth::from_request_parts(parts, state).await?;
        if current.user.is_admin() {
            Ok(Self(current))
        } else {
            Err(AppError::Forbidden("Administrator access required".to_string()))
        }
    }
}

/// Pull the token out of an `Authorization` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let raw = header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or(AuthError::InvalidToken)?;
    let token = PlainToken::parse(raw).map_err(|_| AuthError::InvalidToken)?;
    let now = Utc::now();

    if let Some(cached) = state.token_cache().get(&token.id()).await {
        if !token.matches_hash(&cached.token.token_hash) {
            return Err(AuthError::InvalidToken.into());
        }
        if cached.token.is_expired(now) {
            state.token_cache().invalidate(&token.id()).await;
            return Err(AuthError::TokenExpired.into());
        }
        return Ok(Some(CurrentUser {
            user: cached.user,
            token_id: token.id(),
        }));
    }

    let auth = AuthService::new(state.pool(), state.config().token_ttl_days);
    let (user, stored) = auth.resolve_token(&token, now).await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    tracing::Span::current().record("user_id", tracing::field::display(user.id));

    state
        .token_cache()
        .insert(
            stored.id,
            CachedToken {
                token: stored,
                user: user.clone(),
            },
        )
        .await;

    Ok(Some(CurrentUser {
        user,
        token_id: token.id(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer 12|abc"), Some("12|abc"));
        assert_eq!(bearer_token("bearer  12|abc "), Some("12|abc"));
        assert_eq!(bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("12|abc"), None);
    }
}
