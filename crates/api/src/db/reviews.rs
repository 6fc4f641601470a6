//! Review repository.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use bazaar_core::{ProductId, ReviewId, UserId};

use super::{Page, RepositoryError};
use crate::models::{RatingSummary, Review};

const REVIEW_SELECT: &str = "SELECT r.id, r.product_id, r.user_id, u.name AS user_name, \
     r.rating, r.comment, r.created_at \
     FROM reviews r JOIN users u ON u.id = r.user_id";

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List live reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: Page,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} \
             WHERE r.product_id = $1 AND r.deleted_at IS NULL \
             ORDER BY r.created_at DESC, r.id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(product_id)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Average rating and count of live reviews for a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn summary(&self, product_id: ProductId) -> Result<RatingSummary, RepositoryError> {
        let (average, count): (Option<Decimal>, i64) = sqlx::query_as(
            "SELECT ROUND(AVG(rating), 2), COUNT(*) FROM reviews \
             WHERE product_id = $1 AND deleted_at IS NULL",
        )
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;
        Ok(RatingSummary { average, count })
    }

    /// Get a live review by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.id = $1 AND r.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Create a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user already reviewed the product.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, comment))]
    pub async fn create(
        &self,
        product_id: ProductId,
        user_id: UserId,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, RepositoryError> {
        let id = sqlx::query_scalar::<_, ReviewId>(
            "INSERT INTO reviews (product_id, user_id, rating, comment) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "you have already reviewed this product"))?;

        self.get(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Soft delete a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the review does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE reviews SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
