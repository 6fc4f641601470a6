//! Review route handlers. Listing and creation live under `/product/{id}/reviews`.

use axum::{Router, extract::State, routing::delete};
use bazaar_core::ReviewId;
use tracing::instrument;

use crate::db::ReviewRepository;
use crate::error::{AppError, Result};
use crate::extract::ApiPath;
use crate::middleware::RequireAuth;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Build the `/review` router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", delete(destroy))
}

/// Soft delete a review. Allowed for its author and admins.
///
/// # Errors
///
/// Returns 404 if the review does not exist, 403 for anyone else's review.
#[instrument(skip_all, fields(user_id = %current.user.id, review_id = %id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<ReviewId>,
) -> Result<ApiResponse<()>> {
    let repo = ReviewRepository::new(state.pool());
    let review = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Review".to_owned()))?;

    if review.user_id != current.user.id && !current.user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only delete your own reviews".to_owned(),
        ));
    }

    repo.soft_delete(id).await?;

    tracing::info!("Review deleted");
    Ok(ApiResponse::message("Review deleted"))
}
