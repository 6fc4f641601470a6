//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] bazaar_core::EmailError),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Corporate registration without a company name.
    #[error("company name is required for corporate accounts")]
    MissingCompanyName,

    /// Corporate account has not been reviewed yet.
    #[error("account is awaiting approval")]
    AwaitingApproval,

    /// Corporate account was rejected by staff.
    #[error("account was rejected")]
    AccountRejected,

    /// Bearer token missing, malformed, unknown or revoked.
    #[error("invalid token")]
    InvalidToken,

    /// Bearer token is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
