//! User repository for database operations.
//!
//! Soft-deleted users (`deleted_at IS NOT NULL`) are invisible to every
//! lookup here.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use bazaar_core::{CorporateStatus, Email, UserId, UserRole};

use super::{Page, RepositoryError};
use crate::models::user::{User, UserCredentials};

// =============================================================================
// Internal Row Types
// =============================================================================

const USER_COLUMNS: &str = "id, name, email, phone, role, company_name, corporate_status, \
     corporate_note, notification_preferences, created_at, updated_at";

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    phone: Option<String>,
    role: UserRole,
    company_name: Option<String>,
    corporate_status: Option<CorporateStatus>,
    corporate_note: Option<String>,
    notification_preferences: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email,
            phone: row.phone,
            role: row.role,
            company_name: row.company_name,
            corporate_status: row.corporate_status,
            corporate_note: row.corporate_note,
            notification_preferences: row.notification_preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Fields for a new account.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a Email,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: UserRole,
    pub company_name: Option<&'a str>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user and their password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn get_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users \
             WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(UserCredentials {
                user: r.user.try_into()?,
                password_hash: r.password_hash,
            })
        })
        .transpose()
    }

    /// Create a new account.
    ///
    /// Corporate accounts start in `pending`; other roles have no corporate status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, new), fields(email = %new.email, role = %new.role))]
    pub async fn create(&self, new: &NewUser<'_>) -> Result<User, RepositoryError> {
        let corporate_status =
            (new.role == UserRole::Corporate).then_some(CorporateStatus::Pending);

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (name, email, phone, password_hash, role, company_name, corporate_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.name)
        .bind(new.email.as_str())
        .bind(new.phone)
        .bind(new.password_hash)
        .bind(new.role)
        .bind(new.company_name)
        .bind(corporate_status)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "email already exists"))?;

        row.try_into()
    }

    /// List users, newest first, optionally filtered by role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        role: Option<UserRole>,
        page: Page,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE deleted_at IS NULL AND ($1::user_role IS NULL OR role = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(role)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE deleted_at IS NULL AND ($1::user_role IS NULL OR role = $1)",
        )
        .bind(role)
        .fetch_one(self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    /// List corporate accounts, oldest first so the review queue is FIFO.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_corporate(
        &self,
        status: Option<CorporateStatus>,
        page: Page,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE deleted_at IS NULL AND role = 'corporate' \
               AND ($1::corporate_status IS NULL OR corporate_status = $1) \
             ORDER BY created_at, id \
             LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users \
             WHERE deleted_at IS NULL AND role = 'corporate' \
               AND ($1::corporate_status IS NULL OR corporate_status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    /// Set the review state of a corporate account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no live corporate user has this ID.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, note))]
    pub async fn set_corporate_status(
        &self,
        id: UserId,
        status: CorporateStatus,
        note: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET corporate_status = $2, corporate_note = $3 \
             WHERE id = $1 AND role = 'corporate' AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(note)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Replace a user's notification preferences.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, preferences))]
    pub async fn update_notification_preferences(
        &self,
        id: UserId,
        preferences: &serde_json::Value,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET notification_preferences = $2 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(preferences)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Soft delete a user and revoke all of their tokens.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM personal_access_tokens WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
