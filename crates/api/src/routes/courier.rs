//! Courier status lookups for staff.

use axum::{Router, extract::State, routing::get};
use serde::Serialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::extract::ApiPath;
use crate::middleware::RequireAdmin;
use crate::response::ApiResponse;
use crate::services::courier::LookupKind;
use crate::state::AppState;

/// Build the `/courier` router.
pub fn router() -> Router<AppState> {
    Router::new().route("/status/{kind}/{value}", get(status))
}

#[derive(Debug, Serialize)]
pub struct DeliveryStatus {
    pub delivery_status: String,
}

/// Ask the courier for a parcel's status by consignment ID, invoice or
/// tracking code.
///
/// # Errors
///
/// Returns 400 for an unknown lookup kind or without courier credentials and
/// 502 if the courier API fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, kind = ?kind))]
pub async fn status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath((kind, value)): ApiPath<(LookupKind, String)>,
) -> Result<ApiResponse<DeliveryStatus>> {
    let courier = state
        .courier()
        .ok_or_else(|| AppError::BadRequest("Courier integration is not configured".to_owned()))?;

    let delivery_status = courier.delivery_status(kind, &value).await?;
    Ok(ApiResponse::ok(
        "Delivery status",
        DeliveryStatus { delivery_status },
    ))
}
