//! Authentication service.
//!
//! Password accounts with Sanctum-style personal access tokens: the client
//! receives `"{id}|{secret}"` once, the database keeps only a digest of the
//! secret.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;

use bazaar_core::{CorporateStatus, Email, PlainToken, TokenId, UserRole};

use crate::db::RepositoryError;
use crate::db::tokens::{StoredToken, TokenRepository};
use crate::db::users::{NewUser, UserRepository};
use crate::models::user::User;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Token name used when the client does not send a device name.
const DEFAULT_DEVICE_NAME: &str = "api";

/// Kind of account requested at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Customer,
    Corporate,
}

/// Registration input.
#[derive(Debug)]
pub struct Registration<'r> {
    pub name: &'r str,
    pub email: &'r str,
    pub password: &'r str,
    pub phone: Option<&'r str>,
    pub account_type: AccountType,
    pub company_name: Option<&'r str>,
}

/// A freshly issued access token. The plaintext is never shown again.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
///
/// Handles registration, login, token issuance and bearer token resolution.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: TokenRepository<'a>,
    token_ttl: Duration,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(pool: &'a PgPool, token_ttl_days: i64) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenRepository::new(pool),
            token_ttl: Duration::days(token_ttl_days),
        }
    }

    /// Register a customer or corporate account.
    ///
    /// Customers are signed in straight away and get a token. Corporate
    /// accounts start `pending` and get no token until staff approve them.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::MissingCompanyName` for a corporate account without a company.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, registration), fields(account_type = ?registration.account_type))]
    pub async fn register(
        &self,
        registration: &Registration<'_>,
    ) -> Result<(User, Option<IssuedToken>), AuthError> {
        let email = Email::parse(registration.email)?;
        validate_password(registration.password)?;

        let (role, company_name) = match registration.account_type {
            AccountType::Customer => (UserRole::Customer, None),
            AccountType::Corporate => {
                let company = registration
                    .company_name
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(AuthError::MissingCompanyName)?;
                (UserRole::Corporate, Some(company))
            }
        };

        let user = self
            .create_user(
                registration.name.trim(),
                &email,
                registration.phone,
                registration.password,
                role,
                company_name,
            )
            .await?;

        if role == UserRole::Corporate {
            tracing::info!(user_id = %user.id, "Corporate account registered, awaiting approval");
            return Ok((user, None));
        }

        let token = self.issue_token(&user, DEFAULT_DEVICE_NAME).await?;
        tracing::info!(user_id = %user.id, "Customer registered");
        Ok((user, Some(token)))
    }

    /// Create a staff account. Used by the CLI.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    #[instrument(skip(self, password))]
    pub async fn create_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;
        self.create_user(name.trim(), &email, None, password, UserRole::Admin, None)
            .await
    }

    async fn create_user(
        &self,
        name: &str,
        email: &Email,
        phone: Option<&str>,
        password: &str,
        role: UserRole,
        company_name: Option<&str>,
    ) -> Result<User, AuthError> {
        let password_hash = hash_password(password)?;

        self.users
            .create(&NewUser {
                name,
                email,
                phone: phone.map(str::trim).filter(|p| !p.is_empty()),
                password_hash: &password_hash,
                role,
                company_name,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Login with email and password and issue a token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    /// Returns `AuthError::AwaitingApproval` / `AuthError::AccountRejected` for
    /// corporate accounts that are not approved.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_name: Option<&str>,
    ) -> Result<(User, IssuedToken), AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = self
            .users
            .get_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;
        ensure_can_sign_in(&credentials.user)?;

        let device_name = device_name
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DEVICE_NAME);
        let token = self.issue_token(&credentials.user, device_name).await?;

        tracing::info!(user_id = %credentials.user.id, "User logged in");
        Ok((credentials.user, token))
    }

    /// Issue a new personal access token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the token cannot be stored.
    pub async fn issue_token(&self, user: &User, name: &str) -> Result<IssuedToken, AuthError> {
        let secret = PlainToken::new_secret();
        let expires_at = Utc::now() + self.token_ttl;
        let id = self
            .tokens
            .create(
                user.id,
                name,
                &bazaar_core::hash_token_secret(&secret),
                expires_at,
            )
            .await?;

        Ok(IssuedToken {
            token: PlainToken::from_parts(id, secret).expose(),
            token_type: "Bearer",
            expires_at,
        })
    }

    /// Resolve a bearer token to its user.
    ///
    /// Returns the stored token row alongside the user so callers can cache
    /// the result and re-check it later without a database round trip.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for unknown, mismatched or orphaned tokens.
    /// Returns `AuthError::TokenExpired` once the token is past its expiry.
    /// Returns the corporate sign-in errors if the account lost its approval.
    #[instrument(skip_all, fields(token_id = %token.id()))]
    pub async fn resolve_token(
        &self,
        token: &PlainToken,
        now: DateTime<Utc>,
    ) -> Result<(User, StoredToken), AuthError> {
        let stored = self
            .tokens
            .get(token.id())
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !token.matches_hash(&stored.token_hash) {
            return Err(AuthError::InvalidToken);
        }
        if stored.is_expired(now) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .users
            .get_by_id(stored.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        ensure_can_sign_in(&user)?;

        self.tokens.touch(stored.id).await?;
        Ok((user, stored))
    }

    /// Revoke a token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the delete fails.
    #[instrument(skip(self))]
    pub async fn logout(&self, token_id: TokenId) -> Result<(), AuthError> {
        self.tokens.delete(token_id).await?;
        Ok(())
    }
}

/// Reject corporate accounts that are not approved.
///
/// # Errors
///
/// Returns `AuthError::AwaitingApproval` or `AuthError::AccountRejected`.
pub fn ensure_can_sign_in(user: &User) -> Result<(), AuthError> {
    if user.role != UserRole::Corporate {
        return Ok(());
    }
    match user.corporate_status {
        Some(CorporateStatus::Approved) => Ok(()),
        Some(CorporateStatus::Rejected) => Err(AuthError::AccountRejected),
        Some(CorporateStatus::Pending) | None => Err(AuthError::AwaitingApproval),
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::UserId;

    use super::*;

    fn user(role: UserRole, corporate_status: Option<CorporateStatus>) -> User {
        User {
            id: UserId::new(1),
            name: "Test".to_owned(),
            email: Email::parse("test@example.com").unwrap(),
            phone: None,
            role,
            company_name: corporate_status.map(|_| "Acme Ltd".to_owned()),
            corporate_status,
            corporate_note: None,
            notification_preferences: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_garbage_hash() {
        assert!(matches!(
            verify_password("whatever", "not-a-hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(
            validate_password("short"),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password("eightchr").is_ok());
    }

    #[test]
    fn test_customers_and_admins_can_sign_in() {
        assert!(ensure_can_sign_in(&user(UserRole::Customer, None)).is_ok());
        assert!(ensure_can_sign_in(&user(UserRole::Admin, None)).is_ok());
    }

    #[test]
    fn test_corporate_sign_in_requires_approval() {
        assert!(matches!(
            ensure_can_sign_in(&user(UserRole::Corporate, Some(CorporateStatus::Pending))),
            Err(AuthError::AwaitingApproval)
        ));
        assert!(matches!(
            ensure_can_sign_in(&user(UserRole::Corporate, Some(CorporateStatus::Rejected))),
            Err(AuthError::AccountRejected)
        ));
        assert!(
            ensure_can_sign_in(&user(UserRole::Corporate, Some(CorporateStatus::Approved))).is_ok()
        );
    }
}
