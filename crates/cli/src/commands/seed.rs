//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! categories:
//!   - name: Clothing
//!     children:
//!       - name: Sarees
//! products:
//!   - name: Cotton Saree
//!     sku: SAR-001
//!     category: sarees        # category slug
//!     price: "1500"
//!     stock: 12
//!     discount: { type: percent, value: "10" }
//! shops:
//!   - name: Dhaka Outlet
//!     products: [SAR-001]     # SKUs
//! ```
//!
//! Rows whose slug or SKU already exists are skipped, so the command can be
//! re-run safely.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use bazaar_api::db::categories::CategoryInput;
use bazaar_api::db::products::ProductInput;
use bazaar_api::db::shops::ShopInput;
use bazaar_api::db::{CategoryRepository, ProductRepository, RepositoryError, ShopRepository};
use bazaar_api::models::MenuLink;
use bazaar_api::services::catalog::slugify;
use bazaar_core::{CategoryId, Discount, ProductId, ShopId, Sku};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info};

/// Top-level seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
    #[serde(default)]
    pub shops: Vec<ShopSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySeed {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub children: Vec<CategorySeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductSeed {
    pub name: String,
    pub slug: Option<String>,
    pub sku: String,
    /// Category slug.
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "active")]
    pub is_active: bool,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShopSeed {
    pub name: String,
    pub slug: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub menu_links: Vec<MenuLink>,
    /// SKUs the shop carries.
    #[serde(default)]
    pub products: Vec<String>,
}

const fn active() -> bool {
    true
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub created: usize,
    pub skipped: usize,
}

impl Counts {
    fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.skipped += 1;
        }
    }
}

fn slug_or_name(slug: Option<&str>, name: &str) -> String {
    slug.map_or_else(|| slugify(name), |s| s.trim().to_owned())
}

/// Check the file for problems that do not need the database.
#[must_use]
pub fn validate(seed: &CatalogSeed) -> Vec<String> {
    let mut errors = Vec::new();

    let mut category_slugs = HashSet::new();
    let mut pending: Vec<&CategorySeed> = seed.categories.iter().collect();
    while let Some(category) = pending.pop() {
        let slug = slug_or_name(category.slug.as_deref(), &category.name);
        if slug.is_empty() {
            errors.push(format!("category {:?} has no usable slug", category.name));
        } else if !category_slugs.insert(slug.clone()) {
            errors.push(format!("category slug {slug:?} appears more than once"));
        }
        pending.extend(&category.children);
    }

    let mut skus = HashSet::new();
    for product in &seed.products {
        match Sku::parse(&product.sku) {
            Ok(sku) => {
                if !skus.insert(sku.to_string()) {
                    errors.push(format!("SKU {sku} appears more than once"));
                }
            }
            Err(e) => errors.push(format!("product {:?}: {e}", product.name)),
        }
        if slug_or_name(product.slug.as_deref(), &product.name).is_empty() {
            errors.push(format!("product {:?} has no usable slug", product.name));
        }
        if product.price <= Decimal::ZERO {
            errors.push(format!("product {}: price must be greater than zero", product.sku));
        }
        if let Err(e) = product.discount.validate() {
            errors.push(format!("product {}: {e}", product.sku));
        }
        if product.stock < 0 {
            errors.push(format!("product {}: stock cannot be negative", product.sku));
        }
    }

    for shop in &seed.shops {
        if slug_or_name(shop.slug.as_deref(), &shop.name).is_empty() {
            errors.push(format!("shop {:?} has no usable slug", shop.name));
        }
    }

    errors
}

/// Seed categories, products and shops from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// references unknown categories or SKUs, or a database operation fails.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }
    info!(
        categories = seed.categories.len(),
        products = seed.products.len(),
        shops = seed.shops.len(),
        "Catalog validated"
    );

    let pool = super::connect().await?;

    let categories = seed_categories(&pool, &seed.categories).await?;
    let products = seed_products(&pool, &seed.products).await?;
    let shops = seed_shops(&pool, &seed.shops).await?;

    info!("Seeding complete!");
    info!("  Categories: {} created, {} skipped", categories.created, categories.skipped);
    info!("  Products: {} created, {} skipped", products.created, products.skipped);
    info!("  Shops: {} created, {} skipped", shops.created, shops.skipped);
    Ok(())
}

/// Parents are created before their children.
async fn seed_categories(
    pool: &PgPool,
    categories: &[CategorySeed],
) -> Result<Counts, Box<dyn std::error::Error>> {
    let repo = CategoryRepository::new(pool);
    let mut existing: HashMap<String, CategoryId> = repo
        .list(true)
        .await?
        .into_iter()
        .map(|c| (c.slug, c.id))
        .collect();

    let mut counts = Counts::default();
    let mut queue: VecDeque<(&CategorySeed, Option<CategoryId>)> =
        categories.iter().map(|c| (c, None)).collect();

    while let Some((category, parent_id)) = queue.pop_front() {
        let slug = slug_or_name(category.slug.as_deref(), &category.name);
        let id = if let Some(&id) = existing.get(&slug) {
            counts.record(false);
            id
        } else {
            let created = repo
                .create(&CategoryInput {
                    parent_id,
                    name: category.name.trim().to_owned(),
                    slug: slug.clone(),
                    description: category.description.clone(),
                    position: category.position,
                    is_active: true,
                })
                .await?;
            counts.record(true);
            existing.insert(slug, created.id);
            created.id
        };
        queue.extend(category.children.iter().map(|child| (child, Some(id))));
    }

    Ok(counts)
}

async fn seed_products(
    pool: &PgPool,
    products: &[ProductSeed],
) -> Result<Counts, Box<dyn std::error::Error>> {
    let categories: HashMap<String, CategoryId> = CategoryRepository::new(pool)
        .list(true)
        .await?
        .into_iter()
        .map(|c| (c.slug, c.id))
        .collect();

    let repo = ProductRepository::new(pool);
    let mut counts = Counts::default();
    for product in products {
        let category_id = match product.category.as_deref() {
            Some(slug) => Some(
                *categories
                    .get(slug)
                    .ok_or_else(|| format!("product {}: unknown category {slug:?}", product.sku))?,
            ),
            None => None,
        };

        let input = ProductInput {
            category_id,
            name: product.name.trim().to_owned(),
            slug: slug_or_name(product.slug.as_deref(), &product.name),
            sku: Sku::parse(&product.sku)?,
            description: product.description.clone(),
            price: product.price,
            discount: product.discount,
            stock: product.stock,
            is_active: product.is_active,
            image_url: product.image_url.clone(),
        };
        match repo.create(&input).await {
            Ok(_) => counts.record(true),
            Err(RepositoryError::Conflict(_)) => {
                info!(sku = %input.sku, "Product exists, skipping");
                counts.record(false);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(counts)
}

async fn seed_shops(
    pool: &PgPool,
    shops: &[ShopSeed],
) -> Result<Counts, Box<dyn std::error::Error>> {
    let repo = ShopRepository::new(pool);
    let mut counts = Counts::default();

    for shop in shops {
        let slug = slug_or_name(shop.slug.as_deref(), &shop.name);
        let existing: Option<ShopId> =
            sqlx::query_scalar("SELECT id FROM shops WHERE slug = $1 AND deleted_at IS NULL")
                .bind(&slug)
                .fetch_optional(pool)
                .await?;

        let shop_id = if let Some(id) = existing {
            counts.record(false);
            id
        } else {
            let created = repo
                .create(&ShopInput {
                    owner_id: None,
                    name: shop.name.trim().to_owned(),
                    slug,
                    address: shop.address.clone(),
                    phone: shop.phone.clone(),
                    is_active: true,
                    menu_links: shop.menu_links.clone(),
                })
                .await?;
            counts.record(true);
            created.id
        };

        if shop.products.is_empty() {
            continue;
        }
        let found: Vec<(String, ProductId)> = sqlx::query_as(
            "SELECT sku, id FROM products WHERE sku = ANY($1) AND deleted_at IS NULL",
        )
        .bind(&shop.products)
        .fetch_all(pool)
        .await?;
        let known: HashSet<&str> = found.iter().map(|(sku, _)| sku.as_str()).collect();
        if let Some(missing) = shop.products.iter().find(|sku| !known.contains(sku.as_str())) {
            return Err(format!("shop {:?}: unknown SKU {missing}", shop.name).into());
        }

        let ids: Vec<ProductId> = found.into_iter().map(|(_, id)| id).collect();
        let attached = repo.attach_products(shop_id, &ids).await?;
        info!(shop = %shop.name, attached, "Shop products attached");
    }

    Ok(counts)
}
