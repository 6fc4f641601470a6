//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use bazaar_core::TokenId;

use crate::config::ApiConfig;
use crate::db::tokens::StoredToken;
use crate::models::{CategoryNode, User};
use crate::services::courier::{CourierError, SteadfastClient};

/// How long a resolved bearer token is trusted without a database lookup.
const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

/// How long the category tree is served from memory.
const CATEGORY_TREE_TTL: Duration = Duration::from_secs(300);

/// A resolved bearer token, kept so repeat requests skip the database.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: StoredToken,
    pub user: User,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    courier: Option<SteadfastClient>,
    tokens: Cache<TokenId, CachedToken>,
    category_tree: Cache<(), Arc<Vec<CategoryNode>>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The courier client is only built when credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the courier client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, CourierError> {
        let courier = config
            .courier
            .as_ref()
            .map(SteadfastClient::new)
            .transpose()?;

        let tokens = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(TOKEN_CACHE_TTL)
            .build();
        let category_tree = Cache::builder()
            .max_capacity(1)
            .time_to_live(CATEGORY_TREE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                courier,
                tokens,
                category_tree,
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The courier client, if courier credentials are configured.
    #[must_use]
    pub fn courier(&self) -> Option<&SteadfastClient> {
        self.inner.courier.as_ref()
    }

    /// Resolved bearer tokens by token ID.
    #[must_use]
    pub fn token_cache(&self) -> &Cache<TokenId, CachedToken> {
        &self.inner.tokens
    }

    /// Drop cached resolutions for revoked tokens.
    pub async fn forget_tokens(&self, ids: &[TokenId]) {
        for id in ids {
            self.inner.tokens.invalidate(id).await;
        }
    }

    /// The cached category tree, if present.
    pub async fn cached_category_tree(&self) -> Option<Arc<Vec<CategoryNode>>> {
        self.inner.category_tree.get(&()).await
    }

    /// Store a freshly built category tree.
    pub async fn cache_category_tree(&self, tree: Arc<Vec<CategoryNode>>) {
        self.inner.category_tree.insert((), tree).await;
    }

    /// Drop the cached category tree after a catalog write.
    pub async fn invalidate_category_tree(&self) {
        self.inner.category_tree.invalidate(&()).await;
    }
}
