//! Personal access token repository.
//!
//! Rows hold only the SHA-256 digest of each token secret.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use bazaar_core::{TokenId, UserId};

use super::RepositoryError;

/// A stored token row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub name: String,
    pub token_hash: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Whether the token can no longer be used at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Repository for personal access tokens.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    /// Create a new token repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new token digest and return its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a digest collision.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, token_hash))]
    pub async fn create(
        &self,
        user_id: UserId,
        name: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<TokenId, RepositoryError> {
        sqlx::query_scalar::<_, TokenId>(
            "INSERT INTO personal_access_tokens (user_id, name, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(user_id)
        .bind(name)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "token already exists"))
    }

    /// Get a token row by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: TokenId) -> Result<Option<StoredToken>, RepositoryError> {
        let row = sqlx::query_as::<_, StoredToken>(
            "SELECT id, user_id, name, token_hash, last_used_at, expires_at \
             FROM personal_access_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Record that a token was just used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn touch(&self, id: TokenId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE personal_access_tokens SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Revoke a single token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: TokenId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// IDs of every token a user holds, so callers can drop cache entries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn ids_for_user(&self, user_id: UserId) -> Result<Vec<TokenId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, TokenId>(
            "SELECT id FROM personal_access_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }

    /// Delete tokens that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
