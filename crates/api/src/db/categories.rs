//! Category repository.
//!
//! Categories form a tree through `parent_id`. Deletes are soft.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::instrument;

use bazaar_core::CategoryId;

use super::RepositoryError;
use crate::models::Category;

const CATEGORY_COLUMNS: &str =
    "id, parent_id, name, slug, description, position, is_active, created_at, updated_at";

/// Full set of writable category fields.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i32,
    pub is_active: bool,
}

/// Repository for category database operations.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List live categories ordered for display.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE deleted_at IS NULL AND ($1 OR is_active) \
             ORDER BY position, name"
        ))
        .bind(include_inactive)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Get a live category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Direct children of a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn children(&self, id: CategoryId) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE parent_id = $1 AND deleted_at IS NULL \
             ORDER BY position, name"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// `id -> parent_id` for every live category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn parent_map(
        &self,
    ) -> Result<HashMap<CategoryId, Option<CategoryId>>, RepositoryError> {
        let rows = sqlx::query_as::<_, (CategoryId, Option<CategoryId>)>(
            "SELECT id, parent_id FROM categories WHERE deleted_at IS NULL",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create(&self, input: &CategoryInput) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, Category>(&format!(
            "INSERT INTO categories (parent_id, name, slug, description, position, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(input.parent_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.position)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "category slug already exists"))?;
        Ok(row)
    }

    /// Overwrite every writable field of a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, Category>(&format!(
            "UPDATE categories SET parent_id = $2, name = $3, slug = $4, description = $5, \
                 position = $6, is_active = $7 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(input.parent_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.position)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "category slug already exists"))?;

        row.ok_or(RepositoryError::NotFound)
    }

    /// Soft delete a category that has no live children and no live products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    /// Returns `RepositoryError::Conflict` if it still has children or products.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<CategoryId> = sqlx::query_scalar(
            "SELECT id FROM categories WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let (children, products): (i64, i64) = sqlx::query_as(
            "SELECT \
                 (SELECT COUNT(*) FROM categories WHERE parent_id = $1 AND deleted_at IS NULL), \
                 (SELECT COUNT(*) FROM products WHERE category_id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if children > 0 {
            return Err(RepositoryError::Conflict(format!(
                "category has {children} subcategories"
            )));
        }
        if products > 0 {
            return Err(RepositoryError::Conflict(format!(
                "category has {products} products"
            )));
        }

        sqlx::query("UPDATE categories SET deleted_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
