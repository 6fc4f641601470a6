//! Category route handlers.

use std::sync::Arc;

use axum::{Router, extract::State, routing::get};
use bazaar_core::CategoryId;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::CategoryRepository;
use crate::db::categories::CategoryInput;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{OptionalAuth, RequireAdmin};
use crate::models::{Category, CategoryNode};
use crate::response::ApiResponse;
use crate::services::catalog::{build_tree, slugify, would_create_cycle};
use crate::state::AppState;
use crate::validation::{FieldErrors, nullable, optional_text, required_text};

/// Build the `/category` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/tree", get(tree))
        .route("/{id}", get(show).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Create body. Omitted fields take defaults.
#[derive(Debug, Deserialize)]
pub struct CreateCategory {
    #[serde(default)]
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub description: Option<String>,
    pub position: Option<i32>,
    pub is_active: Option<bool>,
}

/// Update body. Omitted fields keep their value; `null` clears nullable ones.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub position: Option<i32>,
    pub is_active: Option<bool>,
}

/// A category and its direct children.
#[derive(Debug, Serialize)]
pub struct CategoryWithChildren {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
}

/// Accept a caller-supplied slug only if it is already in canonical form.
fn check_slug(errors: &mut FieldErrors, slug: &str) {
    if slug.is_empty() {
        errors.add("slug", "slug is required");
    } else if slugify(slug) != slug {
        errors.add(
            "slug",
            "slug may only contain lowercase letters, digits and dashes",
        );
    }
}

/// Resolve the slug for a new category from the body or the name.
fn resolve_slug(errors: &mut FieldErrors, name: &str, slug: Option<&str>) -> String {
    match slug.map(str::trim) {
        Some(slug) => {
            check_slug(errors, slug);
            slug.to_owned()
        }
        None => {
            let derived = slugify(name);
            if derived.is_empty() && !name.is_empty() {
                errors.add("name", "name must contain at least one letter or digit");
            }
            derived
        }
    }
}

async fn ensure_parent_exists(state: &AppState, parent_id: Option<CategoryId>) -> Result<()> {
    if let Some(parent_id) = parent_id
        && CategoryRepository::new(state.pool())
            .get(parent_id)
            .await?
            .is_none()
    {
        let mut errors = FieldErrors::new();
        errors.add("parent_id", "parent category does not exist");
        return Err(errors.into());
    }
    Ok(())
}

/// List categories ordered by position and name.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip(state, auth))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<ApiResponse<Vec<Category>>> {
    let is_admin = auth.is_some_and(|c| c.user.is_admin());
    let categories = CategoryRepository::new(state.pool())
        .list(query.include_inactive && is_admin)
        .await?;
    Ok(ApiResponse::ok("Categories", categories))
}

/// Active categories nested under their parents.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip(state))]
pub async fn tree(State(state): State<AppState>) -> Result<ApiResponse<Arc<Vec<CategoryNode>>>> {
    if let Some(tree) = state.cached_category_tree().await {
        return Ok(ApiResponse::ok("Category tree", tree));
    }

    let categories = CategoryRepository::new(state.pool()).list(false).await?;
    let tree = Arc::new(build_tree(categories));
    state.cache_category_tree(Arc::clone(&tree)).await;
    Ok(ApiResponse::ok("Category tree", tree))
}

/// A category with its direct children.
///
/// # Errors
///
/// Returns 404 if the category does not exist or is hidden from the caller.
#[instrument(skip(state, auth))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<ApiResponse<CategoryWithChildren>> {
    let repo = CategoryRepository::new(state.pool());
    let is_admin = auth.is_some_and(|c| c.user.is_admin());

    let category = repo
        .get(id)
        .await?
        .filter(|c| c.is_active || is_admin)
        .ok_or_else(|| AppError::NotFound("Category".to_owned()))?;
    let children = repo
        .children(id)
        .await?
        .into_iter()
        .filter(|c| c.is_active || is_admin)
        .collect();

    Ok(ApiResponse::ok(
        "Category",
        CategoryWithChildren { category, children },
    ))
}

/// Create a category.
///
/// # Errors
///
/// Returns 400 for invalid fields or an unknown parent, 409 if the slug is taken.
#[instrument(skip_all, fields(admin_id = %admin.user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateCategory>,
) -> Result<ApiResponse<Category>> {
    let mut errors = FieldErrors::new();
    let name = required_text(&mut errors, "name", &body.name);
    let slug = resolve_slug(&mut errors, &name, body.slug.as_deref());
    errors.into_result()?;
    ensure_parent_exists(&state, body.parent_id).await?;

    let category = CategoryRepository::new(state.pool())
        .create(&CategoryInput {
            parent_id: body.parent_id,
            name,
            slug,
            description: optional_text(body.description.as_deref()),
            position: body.position.unwrap_or(0),
            is_active: body.is_active.unwrap_or(true),
        })
        .await?;
    state.invalidate_category_tree().await;

    tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
    Ok(ApiResponse::created("Category created", category))
}

/// Update a category.
///
/// # Errors
///
/// Returns 404 if missing, 400 for invalid fields or a parent that would form
/// a cycle, 409 if the slug is taken.
#[instrument(skip_all, fields(admin_id = %admin.user.id, category_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(body): ApiJson<UpdateCategory>,
) -> Result<ApiResponse<Category>> {
    let repo = CategoryRepository::new(state.pool());
    let current = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Category".to_owned()))?;

    let mut errors = FieldErrors::new();
    let name = match body.name.as_deref() {
        Some(name) => required_text(&mut errors, "name", name),
        None => current.name.clone(),
    };
    let slug = match body.slug.as_deref().map(str::trim) {
        Some(slug) => {
            check_slug(&mut errors, slug);
            slug.to_owned()
        }
        None => current.slug.clone(),
    };
    let parent_id = body.parent_id.unwrap_or(current.parent_id);
    errors.into_result()?;

    if parent_id != current.parent_id {
        ensure_parent_exists(&state, parent_id).await?;
        if parent_id.is_some() && would_create_cycle(id, parent_id, &repo.parent_map().await?) {
            let mut errors = FieldErrors::new();
            errors.add(
                "parent_id",
                "a category cannot be moved under itself or its descendants",
            );
            return Err(errors.into());
        }
    }

    let description = match body.description {
        Some(description) => optional_text(description.as_deref()),
        None => current.description,
    };
    let category = repo
        .update(
            id,
            &CategoryInput {
                parent_id,
                name,
                slug,
                description,
                position: body.position.unwrap_or(current.position),
                is_active: body.is_active.unwrap_or(current.is_active),
            },
        )
        .await?;
    state.invalidate_category_tree().await;

    tracing::info!("Category updated");
    Ok(ApiResponse::ok("Category updated", category))
}

/// Soft delete a category.
///
/// # Errors
///
/// Returns 404 if missing, 409 if it still has subcategories or products.
#[instrument(skip_all, fields(admin_id = %admin.user.id, category_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<ApiResponse<()>> {
    CategoryRepository::new(state.pool()).soft_delete(id).await?;
    state.invalidate_category_tree().await;

    tracing::info!("Category deleted");
    Ok(ApiResponse::message("Category deleted"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_derived_from_name() {
        let mut errors = FieldErrors::new();
        assert_eq!(
            resolve_slug(&mut errors, "Home & Garden", None),
            "home-garden"
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_explicit_slug_must_be_canonical() {
        let mut errors = FieldErrors::new();
        resolve_slug(&mut errors, "Toys", Some("Toys For Kids"));
        assert!(errors.get("slug").is_some());

        let mut errors = FieldErrors::new();
        assert_eq!(resolve_slug(&mut errors, "Toys", Some("kids-toys")), "kids-toys");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_name_without_alphanumerics_is_rejected() {
        let mut errors = FieldErrors::new();
        resolve_slug(&mut errors, "!!!", None);
        assert!(errors.get("name").is_some());
    }

    #[test]
    fn test_update_body_distinguishes_clearing_parent() {
        let keep: UpdateCategory = serde_json::from_str(r#"{"name": "Shoes"}"#).unwrap();
        assert_eq!(keep.parent_id, None);

        let clear: UpdateCategory = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(clear.parent_id, Some(None));
    }
}
