//! Database operations for the Bazaar `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts (admin, customer, corporate) with soft delete
//! - `personal_access_tokens` - Hashed bearer tokens
//! - `categories` - Category tree (adjacency list via `parent_id`)
//! - `products` - Catalog with price, discount window and stock
//! - `shops` / `shop_product` - Shops and the products they carry
//! - `reviews` - One review per user per product
//! - `customers` - Shipping contact captured at checkout
//! - `orders` / `order_details` - Orders and their priced lines
//! - `transactions` - Payment records per order
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```

pub mod categories;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod shops;
pub mod tokens;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use categories::CategoryRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use shops::ShopRepository;
pub use tokens::TokenRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict` with `message`, anything else to `Database`.
    pub(crate) fn unique_or(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Offset pagination shared by list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub page: i64,
    /// Rows per page.
    pub per_page: i64,
}

impl Page {
    /// Default rows per page.
    pub const DEFAULT_PER_PAGE: i64 = 20;
    /// Largest accepted page size.
    pub const MAX_PER_PAGE: i64 = 100;
    /// Largest accepted page number; keeps `offset` within `i64`.
    pub const MAX_PAGE: i64 = i64::MAX / Self::MAX_PER_PAGE;

    /// Build a page from optional query values, clamping to sane bounds.
    #[must_use]
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, Self::MAX_PAGE),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Row offset for `OFFSET`.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::default();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 20);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_clamps() {
        let page = Page::new(Some(0), Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 100);

        let page = Page::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
    }

    #[test]
    fn test_huge_page_number_does_not_overflow() {
        let page = Page::new(Some(i64::MAX), Some(Page::MAX_PER_PAGE));
        assert_eq!(page.page, Page::MAX_PAGE);
        assert!(page.offset() > 0);

        let page = Page::new(Some(i64::MAX), None);
        assert!(page.offset() > 0);
    }
}
