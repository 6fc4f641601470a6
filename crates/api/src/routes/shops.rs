//! Shop route handlers, including the products a shop carries.

use axum::{
    Router,
    extract::State,
    routing::{delete, get},
};
use bazaar_core::{ProductId, ShopId, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::products::ProductFilter;
use crate::db::shops::ShopInput;
use crate::db::{Page, ProductRepository, ShopRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::{MenuLink, Shop};
use crate::response::{ApiResponse, Paginated};
use crate::routes::products::PricedProduct;
use crate::services::catalog::slugify;
use crate::state::AppState;
use crate::validation::{FieldErrors, is_valid_phone, nullable, optional_text};

/// Most menu links a shop may have.
const MAX_MENU_LINKS: usize = 20;

/// Build the `/shop` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route(
            "/{id}/products",
            get(products).post(attach_products).put(sync_products),
        )
        .route("/{id}/products/{product_id}", delete(detach_product))
}

#[derive(Debug, Default, Deserialize)]
pub struct ShopListQuery {
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShopProductsQuery {
    pub q: Option<String>,
    pub in_stock: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create body.
#[derive(Debug, Default, Deserialize)]
pub struct CreateShop {
    #[serde(default)]
    pub name: String,
    pub slug: Option<String>,
    pub owner_id: Option<UserId>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub menu_links: Vec<MenuLink>,
}

/// Update body. Omitted fields keep their value; `null` clears nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateShop {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub owner_id: Option<Option<UserId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub menu_links: Option<Vec<MenuLink>>,
}

/// Product IDs to attach or sync.
#[derive(Debug, Deserialize)]
pub struct ProductIds {
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Serialize)]
pub struct AttachResult {
    pub attached: u64,
}

/// Validate the fields shared by create and update.
fn validate_shop(
    name: &str,
    slug: Option<&str>,
    phone: Option<&str>,
    menu_links: &[MenuLink],
) -> std::result::Result<(String, String), FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = name.trim().to_owned();
    errors.check(name.is_empty(), "name", "name is required");

    let slug = match slug.map(str::trim) {
        Some(slug) => {
            errors.check(
                slug.is_empty() || slugify(slug) != slug,
                "slug",
                "slug may only contain lowercase letters, digits and dashes",
            );
            slug.to_owned()
        }
        None => {
            let derived = slugify(&name);
            errors.check(
                derived.is_empty() && !name.is_empty(),
                "name",
                "name must contain at least one letter or digit",
            );
            derived
        }
    };

    if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
        errors.check(!is_valid_phone(phone), "phone", "phone number is invalid");
    }

    errors.check(
        menu_links.len() > MAX_MENU_LINKS,
        "menu_links",
        "too many menu links",
    );
    for (i, link) in menu_links.iter().enumerate() {
        if link.label.trim().is_empty() {
            errors.add(format!("menu_links.{i}.label"), "label is required");
        }
        if !is_menu_url(&link.url) {
            errors.add(
                format!("menu_links.{i}.url"),
                "url must be an absolute http(s) URL or a path starting with /",
            );
        }
    }

    errors.into_result()?;
    Ok((name, slug))
}

fn is_menu_url(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with('/') && !value.starts_with("//") {
        return true;
    }
    url::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

async fn ensure_owner_exists(state: &AppState, owner_id: Option<UserId>) -> Result<()> {
    if let Some(owner_id) = owner_id
        && UserRepository::new(state.pool())
            .get_by_id(owner_id)
            .await?
            .is_none()
    {
        let mut errors = FieldErrors::new();
        errors.add("owner_id", "user does not exist");
        return Err(errors.into());
    }
    Ok(())
}

/// Reject product IDs that do not name live products.
async fn ensure_products_exist(state: &AppState, ids: &[ProductId]) -> Result<Vec<ProductId>> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let found = ProductRepository::new(state.pool())
        .existing_ids(&ids)
        .await?;
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains(id))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Unknown products: {}",
            missing.join(", ")
        )));
    }
    Ok(ids)
}

async fn find_visible(state: &AppState, id: ShopId, is_admin: bool) -> Result<Shop> {
    ShopRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|s| s.is_active || is_admin)
        .ok_or_else(|| AppError::NotFound("Shop".to_owned()))
}

/// List shops by name.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiQuery(query): ApiQuery<ShopListQuery>,
) -> Result<ApiResponse<Paginated<Shop>>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let page = Page::new(query.page, query.per_page);
    let (shops, total) = ShopRepository::new(state.pool())
        .list(query.include_inactive && is_admin, page)
        .await?;
    Ok(ApiResponse::ok("Shops", Paginated::new(shops, page, total)))
}

/// A single shop.
///
/// # Errors
///
/// Returns 404 if the shop does not exist or is hidden from the caller.
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiPath(id): ApiPath<ShopId>,
) -> Result<ApiResponse<Shop>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let shop = find_visible(&state, id, is_admin).await?;
    Ok(ApiResponse::ok("Shop", shop))
}

/// Create a shop.
///
/// # Errors
///
/// Returns 400 for invalid fields, 409 if the slug is taken.
#[instrument(skip_all, fields(admin_id = %admin.user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateShop>,
) -> Result<ApiResponse<Shop>> {
    let (name, slug) = validate_shop(
        &body.name,
        body.slug.as_deref(),
        body.phone.as_deref(),
        &body.menu_links,
    )?;
    ensure_owner_exists(&state, body.owner_id).await?;

    let shop = ShopRepository::new(state.pool())
        .create(&ShopInput {
            owner_id: body.owner_id,
            name,
            slug,
            address: optional_text(body.address.as_deref()),
            phone: optional_text(body.phone.as_deref()),
            is_active: body.is_active.unwrap_or(true),
            menu_links: body.menu_links,
        })
        .await?;

    tracing::info!(shop_id = %shop.id, slug = %shop.slug, "Shop created");
    Ok(ApiResponse::created("Shop created", shop))
}

/// Partially update a shop.
///
/// # Errors
///
/// Returns 404 if missing, 400 for invalid fields, 409 if the slug is taken.
#[instrument(skip_all, fields(admin_id = %admin.user.id, shop_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ShopId>,
    ApiJson(body): ApiJson<UpdateShop>,
) -> Result<ApiResponse<Shop>> {
    let repo = ShopRepository::new(state.pool());
    let current = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Shop".to_owned()))?;

    let phone = body.phone.unwrap_or(current.phone);
    let menu_links = body.menu_links.unwrap_or(current.menu_links);
    let (name, slug) = validate_shop(
        body.name.as_deref().unwrap_or(&current.name),
        Some(body.slug.as_deref().unwrap_or(&current.slug)),
        phone.as_deref(),
        &menu_links,
    )?;
    let owner_id = body.owner_id.unwrap_or(current.owner_id);
    if owner_id != current.owner_id {
        ensure_owner_exists(&state, owner_id).await?;
    }

    let shop = repo
        .update(
            id,
            &ShopInput {
                owner_id,
                name,
                slug,
                address: optional_text(body.address.unwrap_or(current.address).as_deref()),
                phone: optional_text(phone.as_deref()),
                is_active: body.is_active.unwrap_or(current.is_active),
                menu_links,
            },
        )
        .await?;

    tracing::info!("Shop updated");
    Ok(ApiResponse::ok("Shop updated", shop))
}

/// Soft delete a shop.
///
/// # Errors
///
/// Returns 404 if the shop does not exist.
#[instrument(skip_all, fields(admin_id = %admin.user.id, shop_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ShopId>,
) -> Result<ApiResponse<()>> {
    ShopRepository::new(state.pool()).soft_delete(id).await?;

    tracing::info!("Shop deleted");
    Ok(ApiResponse::message("Shop deleted"))
}

/// Products carried by a shop.
///
/// # Errors
///
/// Returns 404 if the shop does not exist or is hidden from the caller.
#[instrument(skip(state, auth))]
pub async fn products(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiPath(id): ApiPath<ShopId>,
    ApiQuery(query): ApiQuery<ShopProductsQuery>,
) -> Result<ApiResponse<Paginated<PricedProduct>>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let shop = find_visible(&state, id, is_admin).await?;

    let filter = ProductFilter {
        q: query.q,
        shop_id: Some(shop.id),
        in_stock: query.in_stock,
        include_inactive: is_admin,
        ..ProductFilter::default()
    };
    let page = Page::new(query.page, query.per_page);
    let (products, total) = ProductRepository::new(state.pool())
        .list(&filter, page)
        .await?;

    Ok(ApiResponse::ok(
        "Shop products",
        Paginated::new(PricedProduct::priced(products), page, total),
    ))
}

/// Add products to a shop.
///
/// # Errors
///
/// Returns 404 for an unknown shop, 400 for unknown products.
#[instrument(skip_all, fields(admin_id = %admin.user.id, shop_id = %id))]
pub async fn attach_products(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ShopId>,
    ApiJson(body): ApiJson<ProductIds>,
) -> Result<ApiResponse<AttachResult>> {
    find_visible(&state, id, true).await?;
    if body.product_ids.is_empty() {
        let mut errors = FieldErrors::new();
        errors.add("product_ids", "at least one product is required");
        return Err(errors.into());
    }
    let ids = ensure_products_exist(&state, &body.product_ids).await?;

    let attached = ShopRepository::new(state.pool())
        .attach_products(id, &ids)
        .await?;

    tracing::info!(attached, "Products attached to shop");
    Ok(ApiResponse::ok("Products attached", AttachResult { attached }))
}

/// Replace the set of products a shop carries. An empty list clears it.
///
/// # Errors
///
/// Returns 404 for an unknown shop, 400 for unknown products.
#[instrument(skip_all, fields(admin_id = %admin.user.id, shop_id = %id))]
pub async fn sync_products(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ShopId>,
    ApiJson(body): ApiJson<ProductIds>,
) -> Result<ApiResponse<()>> {
    find_visible(&state, id, true).await?;
    let ids = ensure_products_exist(&state, &body.product_ids).await?;

    ShopRepository::new(state.pool())
        .sync_products(id, &ids)
        .await?;

    tracing::info!(count = ids.len(), "Shop products synced");
    Ok(ApiResponse::message("Shop products synced"))
}

/// Stop carrying one product.
///
/// # Errors
///
/// Returns 404 if the shop did not carry the product.
#[instrument(skip_all, fields(admin_id = %admin.user.id, shop_id = %id, product_id = %product_id))]
pub async fn detach_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath((id, product_id)): ApiPath<(ShopId, ProductId)>,
) -> Result<ApiResponse<()>> {
    ShopRepository::new(state.pool())
        .detach_product(id, product_id)
        .await?;

    tracing::info!("Product detached from shop");
    Ok(ApiResponse::message("Product detached"))
}
