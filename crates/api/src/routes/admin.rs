//! Staff route handlers: order fulfilment, payments and account review.
//!
//! Every handler requires an admin token.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    routing::{delete, get, post, put},
};
use bazaar_core::{
    CorporateStatus, OrderId, OrderStatus, TransactionId, TransactionStatus, UserId, UserRole,
};
use serde::Deserialize;
use tracing::instrument;

use crate::db::Page;
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::{Order, Transaction, User};
use crate::response::{ApiResponse, Paginated};
use crate::services::orders::OrderService;
use crate::services::users::UserAdminService;
use crate::state::AppState;
use crate::validation::optional_text;

/// Build the `/admin` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/order", get(list_orders))
        .route("/order/{id}/status", put(update_order_status))
        .route("/order/{id}/courier", post(book_courier))
        .route("/order/{id}/courier/refresh", post(refresh_courier))
        .route("/transaction/{id}/status", put(update_transaction_status))
        .route("/user", get(list_users))
        .route("/user/{id}", delete(delete_user))
        .route("/corporate", get(list_corporate))
        .route("/corporate/{id}/approve", post(approve_corporate))
        .route("/corporate/{id}/reject", post(reject_corporate))
}

fn orders(state: &AppState) -> OrderService<'_> {
    OrderService::new(state.pool(), state.courier())
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CorporateListQuery {
    pub status: Option<CorporateStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusUpdate {
    pub status: TransactionStatus,
    pub reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Rejection {
    pub reason: Option<String>,
}

// =============================================================================
// Orders and payments
// =============================================================================

/// All orders, newest first, optionally by status.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, status = ?query.status))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> Result<ApiResponse<Paginated<Order>>> {
    let page = Page::new(query.page, query.per_page);
    let (items, total) = orders(&state).list(query.status, page).await?;
    Ok(ApiResponse::ok("Orders", Paginated::new(items, page, total)))
}

/// Move an order along its lifecycle. Cancelling restocks its lines.
///
/// # Errors
///
/// Returns 404 for an unknown order, 409 for a transition that is not allowed.
#[instrument(skip_all, fields(admin_id = %admin.user.id, order_id = %id, to = %body.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(body): ApiJson<OrderStatusUpdate>,
) -> Result<ApiResponse<Order>> {
    let order = orders(&state).update_status(id, body.status).await?;
    Ok(ApiResponse::ok("Order status updated", order))
}

/// Book (or retry booking) an order with the courier.
///
/// # Errors
///
/// Returns 400 without courier credentials, 409 if already booked or
/// cancelled, 502 if the courier API fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, order_id = %id))]
pub async fn book_courier(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Order>> {
    let order = orders(&state).book_courier(id).await?;
    Ok(ApiResponse::ok("Order booked with courier", order))
}

/// Fetch the latest delivery status from the courier.
///
/// # Errors
///
/// Returns 400 without courier credentials, 409 if the order was never
/// booked, 502 if the courier API fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, order_id = %id))]
pub async fn refresh_courier(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<ApiResponse<Order>> {
    let order = orders(&state).refresh_courier_status(id).await?;
    Ok(ApiResponse::ok("Courier status refreshed", order))
}

/// Record a payment outcome.
///
/// # Errors
///
/// Returns 404 for an unknown transaction.
#[instrument(skip_all, fields(admin_id = %admin.user.id, transaction_id = %id, to = %body.status))]
pub async fn update_transaction_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<TransactionId>,
    ApiJson(body): ApiJson<TransactionStatusUpdate>,
) -> Result<ApiResponse<Transaction>> {
    let reference = optional_text(body.reference.as_deref());
    let transaction = orders(&state)
        .update_transaction_status(id, body.status, reference.as_deref())
        .await?;
    Ok(ApiResponse::ok("Transaction status updated", transaction))
}

// =============================================================================
// Accounts
// =============================================================================

/// All accounts, optionally by role.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, role = ?query.role))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<ApiResponse<Paginated<User>>> {
    let page = Page::new(query.page, query.per_page);
    let (users, total) = UserAdminService::new(state.pool())
        .list(query.role, page)
        .await?;
    Ok(ApiResponse::ok("Users", Paginated::new(users, page, total)))
}

/// Corporate accounts, optionally by review state.
///
/// # Errors
///
/// Returns an error if the database query fails.
#[instrument(skip_all, fields(admin_id = %admin.user.id, status = ?query.status))]
pub async fn list_corporate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiQuery(query): ApiQuery<CorporateListQuery>,
) -> Result<ApiResponse<Paginated<User>>> {
    let page = Page::new(query.page, query.per_page);
    let (users, total) = UserAdminService::new(state.pool())
        .list_corporate(query.status, page)
        .await?;
    Ok(ApiResponse::ok(
        "Corporate accounts",
        Paginated::new(users, page, total),
    ))
}

/// Approve a corporate account.
///
/// # Errors
///
/// Returns 404 for an unknown user, 400 if it is not corporate, 409 if it is
/// already approved.
#[instrument(skip_all, fields(admin_id = %admin.user.id, user_id = %id))]
pub async fn approve_corporate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<User>> {
    let user = UserAdminService::new(state.pool())
        .approve_corporate(id, &admin.user)
        .await?;
    Ok(ApiResponse::ok("Corporate account approved", user))
}

/// Reject a pending corporate account. The `{"reason"}` body is optional.
///
/// # Errors
///
/// Returns 404 for an unknown user, 400 if it is not corporate, 409 unless it
/// is pending.
#[instrument(skip_all, fields(admin_id = %admin.user.id, user_id = %id))]
pub async fn reject_corporate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
    body: Bytes,
) -> Result<ApiResponse<User>> {
    let rejection = parse_rejection(&body)?;
    let reason = optional_text(rejection.reason.as_deref());
    let user = UserAdminService::new(state.pool())
        .reject_corporate(id, reason.as_deref(), &admin.user)
        .await?;
    Ok(ApiResponse::ok("Corporate account rejected", user))
}

fn parse_rejection(body: &[u8]) -> Result<Rejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Rejection::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Soft delete an account and sign it out everywhere.
///
/// # Errors
///
/// Returns 404 for an unknown user, 409 when deleting yourself.
#[instrument(skip_all, fields(admin_id = %admin.user.id, user_id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<UserId>,
) -> Result<ApiResponse<()>> {
    let revoked = UserAdminService::new(state.pool())
        .delete_user(id, &admin.user)
        .await?;
    state.forget_tokens(&revoked).await;
    Ok(ApiResponse::message("User deleted"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_body_is_optional() {
        assert!(parse_rejection(b"").unwrap().reason.is_none());
        assert!(parse_rejection(b"  \n").unwrap().reason.is_none());
        assert_eq!(
            parse_rejection(br#"{"reason": "No trade licence"}"#)
                .unwrap()
                .reason
                .as_deref(),
            Some("No trade licence")
        );
        assert!(matches!(
            parse_rejection(b"{oops").unwrap_err(),
            AppError::BadRequest(_)
        ));
    }
}
