//! Checkout route handlers.

use axum::{Router, extract::State, routing::post};
use bazaar_core::Quote;
use tracing::instrument;

use crate::error::Result;
use crate::extract::ApiJson;
use crate::middleware::OptionalAuth;
use crate::response::ApiResponse;
use crate::services::checkout::{CheckoutRequest, CheckoutService, PlacedOrder, QuoteRequest};
use crate::state::AppState;

/// Build the `/checkout` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(place))
        .route("/quote", post(quote))
}

fn service(state: &AppState) -> CheckoutService<'_> {
    CheckoutService::new(state.pool(), state.config().shipping, state.courier())
}

/// Price a cart without placing an order.
///
/// # Errors
///
/// Returns 400 for an invalid cart, unknown or unavailable products, or
/// insufficient stock.
#[instrument(skip_all)]
pub async fn quote(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<QuoteRequest>,
) -> Result<ApiResponse<Quote>> {
    let quote = service(&state).quote(&body).await?;
    Ok(ApiResponse::ok("Quote", quote))
}

/// Place an order as a guest or as the signed-in user.
///
/// # Errors
///
/// Returns 400 for invalid details, unknown products or shop, and
/// insufficient stock. Nothing is written on error.
#[instrument(skip_all)]
pub async fn place(
    State(state): State<AppState>,
    OptionalAuth(auth): OptionalAuth,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<ApiResponse<PlacedOrder>> {
    let user = auth.as_ref().map(|c| &c.user);
    let placed = service(&state).place(&body, user).await?;
    Ok(ApiResponse::created("Order placed", placed))
}
