//! Shop repository, including the `shop_product` pivot.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use bazaar_core::{ProductId, ShopId, UserId};

use super::{Page, RepositoryError};
use crate::models::{MenuLink, Shop};

const SHOP_COLUMNS: &str =
    "id, owner_id, name, slug, address, phone, is_active, menu_links, created_at, updated_at";

/// Internal row type for `PostgreSQL` shop queries.
#[derive(Debug, sqlx::FromRow)]
struct ShopRow {
    id: ShopId,
    owner_id: Option<UserId>,
    name: String,
    slug: String,
    address: Option<String>,
    phone: Option<String>,
    is_active: bool,
    menu_links: Json<Vec<MenuLink>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShopRow> for Shop {
    fn from(row: ShopRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            slug: row.slug,
            address: row.address,
            phone: row.phone,
            is_active: row.is_active,
            menu_links: row.menu_links.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Full set of writable shop fields.
#[derive(Debug, Clone)]
pub struct ShopInput {
    pub owner_id: Option<UserId>,
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub menu_links: Vec<MenuLink>,
}

/// Repository for shop database operations.
pub struct ShopRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShopRepository<'a> {
    /// Create a new shop repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List live shops by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        include_inactive: bool,
        page: Page,
    ) -> Result<(Vec<Shop>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, ShopRow>(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops \
             WHERE deleted_at IS NULL AND ($1 OR is_active) \
             ORDER BY name, id LIMIT $2 OFFSET $3"
        ))
        .bind(include_inactive)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shops WHERE deleted_at IS NULL AND ($1 OR is_active)",
        )
        .bind(include_inactive)
        .fetch_one(self.pool)
        .await?;

        Ok((rows.into_iter().map(Shop::from).collect(), total))
    }

    /// Get a live shop by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: ShopId) -> Result<Option<Shop>, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            "SELECT {SHOP_COLUMNS} FROM shops WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Shop::from))
    }

    /// Create a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create(&self, input: &ShopInput) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            "INSERT INTO shops (owner_id, name, slug, address, phone, is_active, menu_links) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {SHOP_COLUMNS}"
        ))
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(input.is_active)
        .bind(Json(&input.menu_links))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "shop slug already exists"))?;
        Ok(row.into())
    }

    /// Overwrite every writable field of a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop does not exist.
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: ShopId, input: &ShopInput) -> Result<Shop, RepositoryError> {
        let row = sqlx::query_as::<_, ShopRow>(&format!(
            "UPDATE shops SET owner_id = $2, name = $3, slug = $4, address = $5, phone = $6, \
                 is_active = $7, menu_links = $8 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {SHOP_COLUMNS}"
        ))
        .bind(id)
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(input.is_active)
        .bind(Json(&input.menu_links))
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "shop slug already exists"))?;

        row.map(Shop::from).ok_or(RepositoryError::NotFound)
    }

    /// Soft delete a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: ShopId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE shops SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Add products to a shop, ignoring ones it already carries.
    ///
    /// Returns how many links were created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn attach_products(
        &self,
        shop_id: ShopId,
        product_ids: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO shop_product (shop_id, product_id) \
             SELECT $1, UNNEST($2::int4[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(shop_id)
        .bind(product_ids)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Make the shop carry exactly `product_ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn sync_products(
        &self,
        shop_id: ShopId,
        product_ids: &[ProductId],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM shop_product WHERE shop_id = $1 AND NOT (product_id = ANY($2))")
            .bind(shop_id)
            .bind(product_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO shop_product (shop_id, product_id) \
             SELECT $1, UNNEST($2::int4[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(shop_id)
        .bind(product_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove one product from a shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the shop did not carry it.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn detach_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop_product WHERE shop_id = $1 AND product_id = $2")
            .bind(shop_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Whether a live shop with this ID exists.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn exists(conn: &mut PgConnection, shop_id: ShopId) -> Result<bool, RepositoryError> {
    let found: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM shops WHERE id = $1 AND deleted_at IS NULL AND is_active",
    )
    .bind(shop_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Which of `product_ids` the shop does not carry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn products_not_carried(
    conn: &mut PgConnection,
    shop_id: ShopId,
    product_ids: &[ProductId],
) -> Result<Vec<ProductId>, RepositoryError> {
    let missing = sqlx::query_scalar::<_, ProductId>(
        "SELECT p.id FROM UNNEST($2::int4[]) AS p(id) \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM shop_product sp WHERE sp.shop_id = $1 AND sp.product_id = p.id \
         ) \
         ORDER BY p.id",
    )
    .bind(shop_id)
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(missing)
}
