//! Product and product review route handlers.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use bazaar_core::{CategoryId, Discount, PriceBreakdown, ProductId, ShopId, Sku};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::products::{ProductFilter, ProductInput};
use crate::db::{CategoryRepository, Page, ProductRepository, ReviewRepository};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{OptionalAuth, RequireAdmin, RequireAuth};
use crate::models::{Product, ProductDetail, RatingSummary, Review};
use crate::response::{ApiResponse, PageQuery, Paginated};
use crate::services::catalog::slugify;
use crate::state::AppState;
use crate::validation::{FieldErrors, nullable, optional_text};

/// Build the `/product` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/stock", post(adjust_stock))
        .route("/{id}/reviews", get(reviews).post(create_review))
}

// =============================================================================
// Request and response types
// =============================================================================

/// `GET /product` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub q: Option<String>,
    pub category_id: Option<CategoryId>,
    pub shop_id: Option<ShopId>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// A product with its current price, for listings.
#[derive(Debug, Serialize)]
pub struct PricedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub pricing: PriceBreakdown,
}

impl PricedProduct {
    pub(crate) fn priced(products: Vec<Product>) -> Vec<Self> {
        let now = Utc::now();
        products
            .into_iter()
            .map(|product| Self {
                pricing: product.pricing(now),
                product,
            })
            .collect()
    }
}

/// Create body.
#[derive(Debug, Default, Deserialize)]
pub struct CreateProduct {
    #[serde(default)]
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub sku: String,
    pub category_id: Option<CategoryId>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub discount: Option<Discount>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub image_url: Option<String>,
}

/// Update body. Omitted fields keep their value; `null` clears nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub discount: Option<Discount>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
}

/// `POST /product/{id}/stock` body.
#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    #[serde(default)]
    pub delta: i32,
}

/// `POST /product/{id}/reviews` body.
#[derive(Debug, Deserialize)]
pub struct CreateReview {
    #[serde(default)]
    pub rating: i16,
    pub comment: Option<String>,
}

/// A page of reviews with the product's rating summary.
#[derive(Debug, Serialize)]
pub struct ReviewPage {
    #[serde(flatten)]
    pub reviews: Paginated<Review>,
    pub summary: RatingSummary,
}

// =============================================================================
// Validation
// =============================================================================

/// Every writable field, before validation.
#[derive(Debug, Clone, Default)]
struct ProductDraft {
    name: String,
    slug: Option<String>,
    sku: String,
    category_id: Option<CategoryId>,
    description: Option<String>,
    price: Option<Decimal>,
    discount: Discount,
    stock: i32,
    is_active: bool,
    image_url: Option<String>,
}

impl From<CreateProduct> for ProductDraft {
    fn from(body: CreateProduct) -> Self {
        Self {
            name: body.name,
            slug: body.slug,
            sku: body.sku,
            category_id: body.category_id,
            description: body.description,
            price: body.price,
            discount: body.discount.unwrap_or_default(),
            stock: body.stock.unwrap_or(0),
            is_active: body.is_active.unwrap_or(true),
            image_url: body.image_url,
        }
    }
}

impl ProductDraft {
    /// Overlay a partial update on a stored product.
    fn patched(current: Product, patch: UpdateProduct) -> Self {
        Self {
            name: patch.name.unwrap_or(current.name),
            slug: Some(patch.slug.unwrap_or(current.slug)),
            sku: patch.sku.unwrap_or_else(|| current.sku.to_string()),
            category_id: patch.category_id.unwrap_or(current.category_id),
            description: patch.description.unwrap_or(current.description),
            price: Some(patch.price.unwrap_or(current.price)),
            discount: patch.discount.unwrap_or(current.discount),
            stock: patch.stock.unwrap_or(current.stock),
            is_active: patch.is_active.unwrap_or(current.is_active),
            image_url: patch.image_url.unwrap_or(current.image_url),
        }
    }

    fn validate(self) -> std::result::Result<ProductInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = self.name.trim().to_owned();
        errors.check(name.is_empty(), "name", "name is required");

        let slug = match self.slug.as_deref().map(str::trim) {
            Some(slug) => {
                errors.check(
                    slug.is_empty() || slugify(slug) != slug,
                    "slug",
                    "slug may only contain lowercase letters, digits and dashes",
                );
                slug.to_owned()
            }
            None => slugify(&name),
        };
        if self.slug.is_none() && slug.is_empty() && !name.is_empty() {
            errors.add("name", "name must contain at least one letter or digit");
        }

        let sku = Sku::parse(&self.sku);
        if let Err(e) = &sku {
            errors.add("sku", e.to_string());
        }

        match self.price {
            None => errors.add("price", "price is required"),
            Some(price) if price <= Decimal::ZERO => {
                errors.add("price", "price must be greater than zero");
            }
            Some(_) => {}
        }
        if let Err(e) = self.discount.validate() {
            errors.add("discount", e.to_string());
        }
        errors.check(self.stock < 0, "stock", "stock cannot be negative");

        let (Ok(sku), Some(price), true) = (sku, self.price, errors.is_empty()) else {
            return Err(errors);
        };

        Ok(ProductInput {
            category_id: self.category_id,
            name,
            slug,
            sku,
            description: optional_text(self.description.as_deref()),
            price,
            discount: self.discount,
            stock: self.stock,
            is_active: self.is_active,
            image_url: optional_text(self.image_url.as_deref()),
        })
    }
}

async fn ensure_category_exists(state: &AppState, category_id: Option<CategoryId>) -> Result<()> {
    if let Some(category_id) = category_id
        && CategoryRepository::new(state.pool())
            .get(category_id)
            .await?
            .is_none()
    {
        let mut errors = FieldErrors::new();
        errors.add("category_id", "category does not exist");
        return Err(errors.into());
    }
    Ok(())
}

/// Look up a product by numeric ID or slug, hiding inactive ones from non-admins.
async fn find_visible(state: &AppState, id_or_slug: &str, is_admin: bool) -> Result<Product> {
    let repo = ProductRepository::new(state.pool());
    let product = match id_or_slug.parse::<i32>() {
        Ok(id) => repo.get(ProductId::new(id)).await?,
        Err(_) => repo.get_by_slug(id_or_slug).await?,
    };
    product
        .filter(|p| p.is_active || is_admin)
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))
}

// =============================================================================
// Handlers
// =============================================================================

/// List products.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiQuery(query): ApiQuery<ProductListQuery>,
) -> Result<ApiResponse<Paginated<PricedProduct>>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let filter = ProductFilter {
        q: query.q,
        category_id: query.category_id,
        shop_id: query.shop_id,
        in_stock: query.in_stock,
        include_inactive: query.include_inactive && is_admin,
    };
    let page = Page::new(query.page, query.per_page);

    let (products, total) = ProductRepository::new(state.pool())
        .list(&filter, page)
        .await?;
    Ok(ApiResponse::ok(
        "Products",
        Paginated::new(PricedProduct::priced(products), page, total),
    ))
}

/// A product by ID or slug, with pricing and rating.
///
/// # Errors
///
/// Returns 404 if the product does not exist or is hidden from the caller.
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiPath(id_or_slug): ApiPath<String>,
) -> Result<ApiResponse<ProductDetail>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let product = find_visible(&state, &id_or_slug, is_admin).await?;
    let rating = ReviewRepository::new(state.pool())
        .summary(product.id)
        .await?;

    Ok(ApiResponse::ok(
        "Product",
        ProductDetail {
            pricing: product.pricing(Utc::now()),
            product,
            rating,
        },
    ))
}

/// Create a product.
///
/// # Errors
///
/// Returns 400 for invalid fields or an unknown category, 409 if the slug or
/// SKU is taken.
#[instrument(skip_all, fields(admin_id = %admin.user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateProduct>,
) -> Result<ApiResponse<Product>> {
    let input = ProductDraft::from(body).validate()?;
    ensure_category_exists(&state, input.category_id).await?;

    let product = ProductRepository::new(state.pool()).create(&input).await?;

    tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
    Ok(ApiResponse::created("Product created", product))
}

/// Partially update a product.
///
/// # Errors
///
/// Returns 404 if missing, 400 for invalid fields, 409 on slug or SKU conflict.
#[instrument(skip_all, fields(admin_id = %admin.user.id, product_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateProduct>,
) -> Result<ApiResponse<Product>> {
    let repo = ProductRepository::new(state.pool());
    let current = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_owned()))?;

    let category_changed = body
        .category_id
        .is_some_and(|category_id| category_id != current.category_id);
    let input = ProductDraft::patched(current, body).validate()?;
    if category_changed {
        ensure_category_exists(&state, input.category_id).await?;
    }

    let product = repo.update(id, &input).await?;

    tracing::info!("Product updated");
    Ok(ApiResponse::ok("Product updated", product))
}

/// Soft delete a product.
///
/// # Errors
///
/// Returns 404 if the product does not exist.
#[instrument(skip_all, fields(admin_id = %admin.user.id, product_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiResponse<()>> {
    ProductRepository::new(state.pool()).soft_delete(id).await?;

    tracing::info!("Product deleted");
    Ok(ApiResponse::message("Product deleted"))
}

/// Add to or remove from a product's stock.
///
/// # Errors
///
/// Returns 404 if missing, 400 for a zero delta, 409 if stock would go
/// negative or past the column limit.
#[instrument(skip_all, fields(admin_id = %admin.user.id, product_id = %id, delta = body.delta))]
pub async fn adjust_stock(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<StockAdjustment>,
) -> Result<ApiResponse<Product>> {
    let mut errors = FieldErrors::new();
    errors.check(body.delta == 0, "delta", "delta must not be zero");
    errors.into_result()?;

    let product = ProductRepository::new(state.pool())
        .adjust_stock(id, body.delta)
        .await?;

    tracing::info!(stock = product.stock, "Stock adjusted");
    Ok(ApiResponse::ok("Stock adjusted", product))
}

/// Reviews of a product, newest first, with the rating summary.
///
/// # Errors
///
/// Returns 404 if the product does not exist or is hidden from the caller.
#[instrument(skip(state, auth))]
pub async fn reviews(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiPath(id): ApiPath<ProductId>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiResponse<ReviewPage>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let product = find_visible(&state, &id.to_string(), is_admin).await?;
    let page = Page::from(page);

    let repo = ReviewRepository::new(state.pool());
    let summary = repo.summary(product.id).await?;
    let reviews = repo.list_for_product(product.id, page).await?;

    Ok(ApiResponse::ok(
        "Reviews",
        ReviewPage {
            reviews: Paginated::new(reviews, page, summary.count),
            summary,
        },
    ))
}

/// Review a product. One review per user per product.
///
/// # Errors
///
/// Returns 400 for a rating outside 1-5, 404 for an unknown product, 409 if
/// the user already reviewed it.
#[instrument(skip_all, fields(user_id = %current.user.id, product_id = %id))]
pub async fn create_review(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<CreateReview>,
) -> Result<ApiResponse<Review>> {
    let mut errors = FieldErrors::new();
    errors.check(
        !(1..=5).contains(&body.rating),
        "rating",
        "rating must be between 1 and 5",
    );
    errors.into_result()?;

    let product = find_visible(&state, &id.to_string(), false).await?;
    let review = ReviewRepository::new(state.pool())
        .create(
            product.id,
            current.user.id,
            body.rating,
            optional_text(body.comment.as_deref()).as_deref(),
        )
        .await?;

    tracing::info!(review_id = %review.id, rating = review.rating, "Review created");
    Ok(ApiResponse::created("Review created", review))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Cotton Saree".to_owned(),
            sku: "SAR-001".to_owned(),
            price: Some(d("1500")),
            is_active: true,
            ..ProductDraft::default()
        }
    }

    #[test]
    fn test_valid_draft_derives_slug() {
        let input = draft().validate().unwrap();
        assert_eq!(input.slug, "cotton-saree");
        assert_eq!(input.sku.as_str(), "SAR-001");
        assert_eq!(input.stock, 0);
    }

    #[test]
    fn test_price_must_be_positive() {
        let errors = ProductDraft {
            price: Some(Decimal::ZERO),
            ..draft()
        }
        .validate()
        .unwrap_err();
        assert!(errors.get("price").is_some());

        let errors = ProductDraft {
            price: None,
            ..draft()
        }
        .validate()
        .unwrap_err();
        assert!(errors.get("price").is_some());
    }

    #[test]
    fn test_collects_every_invalid_field() {
        let errors = ProductDraft {
            name: "  ".to_owned(),
            sku: String::new(),
            stock: -1,
            discount: Discount {
                kind: bazaar_core::DiscountType::Percent,
                value: d("120"),
                ..Discount::none()
            },
            ..draft()
        }
        .validate()
        .unwrap_err();

        for field in ["name", "sku", "stock", "discount"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn test_patch_keeps_unspecified_fields() {
        let now = Utc::now();
        let current = Product {
            id: ProductId::new(7),
            category_id: Some(CategoryId::new(2)),
            name: "Cotton Saree".to_owned(),
            slug: "cotton-saree".to_owned(),
            sku: Sku::parse("SAR-001").unwrap(),
            description: Some("Handwoven".to_owned()),
            price: d("1500"),
            discount: Discount::none(),
            stock: 4,
            is_active: true,
            image_url: None,
            created_at: now,
            updated_at: now,
        };
        let patch: UpdateProduct =
            serde_json::from_str(r#"{"price": "1200", "description": null}"#).unwrap();

        let input = ProductDraft::patched(current, patch).validate().unwrap();
        assert_eq!(input.price, d("1200"));
        assert_eq!(input.description, None);
        assert_eq!(input.category_id, Some(CategoryId::new(2)));
        assert_eq!(input.stock, 4);
        assert_eq!(input.slug, "cotton-saree");
    }
}
