//! Customer-facing order route handlers.

use axum::{Router, extract::State, routing::get};
use bazaar_core::OrderId;
use tracing::instrument;

use crate::db::Page;
use crate::error::Result;
use crate::extract::{ApiPath, ApiQuery};
use crate::middleware::RequireAuth;
use crate::models::{Order, OrderWithDetails, Transaction};
use crate::response::{ApiResponse, PageQuery, Paginated};
use crate::services::orders::OrderService;
use crate::state::AppState;

/// Build the `/order` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/track/{token}", get(track))
        .route("/{id}", get(show))
        .route("/{id}/transactions", get(transactions))
}

fn service(state: &AppState) -> OrderService<'_> {
    OrderService::new(state.pool(), state.courier())
}

/// Track a guest order by the token returned at checkout.
///
/// # Errors
///
/// Returns 404 for an unknown or malformed token.
#[instrument(skip_all)]
pub async fn track(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<ApiResponse<OrderWithDetails>> {
    let order = service(&state).track(&token).await?;
    Ok(ApiResponse::ok("Order", order))
}

/// The signed-in user's orders, newest first.
///
/// # Errors
///
/// Returns 401 without a valid token.
#[instrument(skip_all, fields(user_id = %current.user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Paginated<Order>>> {
    let page = Page::from(page);
    let (orders, total) = service(&state).list_mine(current.user.id, page).await?;
    Ok(ApiResponse::ok("Orders", Paginated::new(orders, page, total)))
}

/// An order with its lines.
///
/// # Errors
///
/// Returns 404 if the order does not exist, 403 if it is someone else's.
#[instrument(skip_all, fields(user_id = %current.user.id, order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<OrderWithDetails>> {
    let order = service(&state).show(id, &current.user).await?;
    Ok(ApiResponse::ok("Order", order))
}

/// Payment records of an order.
///
/// # Errors
///
/// Returns 404 if the order does not exist, 403 if it is someone else's.
#[instrument(skip_all, fields(user_id = %current.user.id, order_id = %id))]
pub async fn transactions(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Vec<Transaction>>> {
    let transactions = service(&state).transactions(id, &current.user).await?;
    Ok(ApiResponse::ok("Transactions", transactions))
}
