//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{CorporateStatus, Email, TokenId, UserId, UserRole};

/// A registered account.
///
/// The password hash never leaves the repository layer except inside
/// [`UserCredentials`].
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
    pub role: UserRole,
    /// Set for corporate accounts only.
    pub company_name: Option<String>,
    /// Review state; `None` unless `role` is corporate.
    pub corporate_status: Option<CorporateStatus>,
    /// Reason given when a corporate account was rejected.
    pub corporate_note: Option<String>,
    /// Arbitrary `{ "channel": bool }` map chosen by the user.
    pub notification_preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account has staff privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// A user together with their password hash, used only for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// The user behind an authenticated request, and the token they presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token_id: TokenId,
}
