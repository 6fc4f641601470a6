//! Product repository.
//!
//! Besides the pool-backed [`ProductRepository`], this module exposes free
//! functions that run on a caller-owned connection so checkout and order
//! cancellation can lock and adjust stock inside their own transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::instrument;

use bazaar_core::{CategoryId, Discount, DiscountType, ProductId, ShopId, Sku};

use super::{Page, RepositoryError};
use crate::models::Product;

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, category_id, name, slug, sku, description, price, \
     discount_type, discount_value, discount_starts_at, discount_ends_at, stock, is_active, \
     image_url, created_at, updated_at";

/// Internal row type for `PostgreSQL` product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    category_id: Option<CategoryId>,
    name: String,
    slug: String,
    sku: String,
    description: Option<String>,
    price: Decimal,
    discount_type: DiscountType,
    discount_value: Decimal,
    discount_starts_at: Option<DateTime<Utc>>,
    discount_ends_at: Option<DateTime<Utc>>,
    stock: i32,
    is_active: bool,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let sku = Sku::parse(&row.sku).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid sku in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            category_id: row.category_id,
            name: row.name,
            slug: row.slug,
            sku,
            description: row.description,
            price: row.price,
            discount: Discount {
                kind: row.discount_type,
                value: row.discount_value,
                starts_at: row.discount_starts_at,
                ends_at: row.discount_ends_at,
            },
            stock: row.stock,
            is_active: row.is_active,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

// =============================================================================
// Inputs
// =============================================================================

/// Full set of writable product fields.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub sku: Sku,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount: Discount,
    pub stock: i32,
    pub is_active: bool,
    pub image_url: Option<String>,
}

/// Filters for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive match on name, SKU or description.
    pub q: Option<String>,
    /// Restrict to this category and all of its descendants.
    pub category_id: Option<CategoryId>,
    /// Restrict to products carried by this shop.
    pub shop_id: Option<ShopId>,
    /// `true` = stock > 0, `false` = sold out.
    pub in_stock: Option<bool>,
    pub include_inactive: bool,
}

/// Escape `LIKE` wildcards in user input.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE deleted_at IS NULL");

    if !filter.include_inactive {
        qb.push(" AND is_active");
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR sku ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(
            " AND category_id IN (WITH RECURSIVE tree AS ( \
                 SELECT id FROM categories WHERE deleted_at IS NULL AND id = ",
        )
        .push_bind(category_id)
        .push(
            " UNION ALL \
                 SELECT c.id FROM categories c JOIN tree t ON c.parent_id = t.id \
                 WHERE c.deleted_at IS NULL \
             ) SELECT id FROM tree)",
        );
    }
    if let Some(shop_id) = filter.shop_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM shop_product sp \
                 WHERE sp.product_id = products.id AND sp.shop_id = ",
        )
        .push_bind(shop_id)
        .push(")");
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND stock > 0");
        }
        Some(false) => {
            qb.push(" AND stock = 0");
        }
        None => {}
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching `filter`, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored SKU is invalid.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await?;

        Ok((into_products(rows)?, total))
    }

    /// Get a live product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored SKU is invalid.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a live product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored SKU is invalid.
    #[instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1 AND deleted_at IS NULL"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Live products with the given IDs, without locking.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored SKU is invalid.
    #[instrument(skip(self))]
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        into_products(rows)
    }

    /// Which of `ids` exist as live products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn existing_ids(&self, ids: &[ProductId]) -> Result<Vec<ProductId>, RepositoryError> {
        let found = sqlx::query_scalar::<_, ProductId>(
            "SELECT id FROM products WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id",
        )
        .bind(ids)
        .fetch_all(self.pool)
        .await?;
        Ok(found)
    }

    /// Create a product with exactly the given fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug or SKU is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (category_id, name, slug, sku, description, price, \
                 discount_type, discount_value, discount_starts_at, discount_ends_at, \
                 stock, is_active, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.sku.as_str())
        .bind(&input.description)
        .bind(input.price)
        .bind(input.discount.kind)
        .bind(input.discount.value)
        .bind(input.discount.starts_at)
        .bind(input.discount.ends_at)
        .bind(input.stock)
        .bind(input.is_active)
        .bind(&input.image_url)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "product slug or sku already exists"))?;

        row.try_into()
    }

    /// Overwrite every writable field of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the slug or SKU is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET category_id = $2, name = $3, slug = $4, sku = $5, \
                 description = $6, price = $7, discount_type = $8, discount_value = $9, \
                 discount_starts_at = $10, discount_ends_at = $11, stock = $12, \
                 is_active = $13, image_url = $14 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(input.category_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.sku.as_str())
        .bind(&input.description)
        .bind(input.price)
        .bind(input.discount.kind)
        .bind(input.discount.value)
        .bind(input.discount.starts_at)
        .bind(input.discount.ends_at)
        .bind(input.stock)
        .bind(input.is_active)
        .bind(&input.image_url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "product slug or sku already exists"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Add `delta` (possibly negative) to a product's stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the result would be negative or
    /// would not fit the `INTEGER` column.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET stock = stock + $2 \
             WHERE id = $1 AND deleted_at IS NULL \
               AND stock::int8 + $2::int8 BETWEEN 0 AND 2147483647 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None if self.get(id).await?.is_some() => Err(RepositoryError::Conflict(
                "stock must stay between 0 and 2147483647".to_owned(),
            )),
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Soft delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE products SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
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

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Lock the given live products `FOR UPDATE`, in ID order.
///
/// Locking in a fixed order keeps concurrent checkouts over overlapping carts
/// from deadlocking. Missing or deleted IDs are simply absent from the result.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
/// Returns `RepositoryError::DataCorruption` if a stored SKU is invalid.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE id = ANY($1) AND deleted_at IS NULL \
         ORDER BY id FOR UPDATE"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    into_products(rows)
}

/// Take `quantity` units out of stock if that many are available.
///
/// Returns `false` (and changes nothing) when stock is short.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
    )
    .bind(id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Put `quantity` units back into stock.
///
/// Soft-deleted products are restocked too, so a later restore keeps counts right.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn restore_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
        .bind(id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("tee"), "%tee%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_push_filters_public_listing() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut qb, &ProductFilter::default());
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM products WHERE deleted_at IS NULL AND is_active"
        );
    }

    #[test]
    fn test_push_filters_binds_in_order() {
        let filter = ProductFilter {
            q: Some("mug".to_owned()),
            shop_id: Some(ShopId::new(3)),
            in_stock: Some(true),
            include_inactive: true,
            ..ProductFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("name ILIKE $1 OR sku ILIKE $2 OR description ILIKE $3"));
        assert!(sql.contains("sp.shop_id = $4"));
        assert!(sql.ends_with("AND stock > 0"));
        assert!(!sql.contains("is_active"));
    }
}
