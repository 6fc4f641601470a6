//! Catalog domain types: categories, products, shops and reviews.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    CategoryId, Discount, PriceBreakdown, ProductId, ProductSnapshot, ReviewId, ShopId, Sku,
    UserId, unit_price,
};

/// A node of the category tree, stored as an adjacency list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category with its children, for tree responses.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// A sellable product.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Unit price after any discount active at `now`.
    #[must_use]
    pub fn pricing(&self, now: DateTime<Utc>) -> PriceBreakdown {
        unit_price(self.price, &self.discount, now)
    }

    /// The fields checkout pricing needs.
    #[must_use]
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            name: self.name.clone(),
            sku: self.sku.to_string(),
            price: self.price,
            discount: self.discount,
            stock: self.stock,
            is_active: self.is_active,
        }
    }
}

/// A product with its current price and rating, for detail responses.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub pricing: PriceBreakdown,
    pub rating: RatingSummary,
}

/// Average rating and review count of a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RatingSummary {
    /// Mean rating rounded to two places; `None` without reviews.
    pub average: Option<Decimal>,
    pub count: i64,
}

/// A navigation link shown on a shop page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLink {
    pub label: String,
    pub url: String,
}

/// A storefront that carries a subset of the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Shop {
    pub id: ShopId,
    pub owner_id: Option<UserId>,
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub menu_links: Vec<MenuLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product review.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// Display name of the author.
    pub user_name: String,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
