//! HTTP route handlers for the JSON API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database ping)
//!
//! # Everything below is nested under /api
//!
//! # Accounts
//! POST /auth/register | /auth/login     - Rate limited
//! POST /auth/logout
//! GET  /auth/me
//! PUT  /auth/me/notifications
//!
//! # Catalog
//! GET  /category  /category/tree  /category/{id}
//! POST /category  PUT/DELETE /category/{id}                     (admin)
//! GET  /product  /product/{id_or_slug}
//! POST /product  PUT/DELETE /product/{id}  POST /product/{id}/stock (admin)
//! GET  /product/{id}/reviews  POST /product/{id}/reviews        (auth)
//! DELETE /review/{id}                                           (owner/admin)
//! GET  /shop  /shop/{id}  /shop/{id}/products
//! POST /shop  PUT/DELETE /shop/{id}                             (admin)
//! POST/PUT /shop/{id}/products  DELETE /shop/{id}/products/{product_id} (admin)
//!
//! # Checkout and orders
//! POST /checkout/quote  /checkout
//! GET  /order/track/{token}
//! GET  /order  /order/{id}  /order/{id}/transactions            (auth)
//!
//! # Staff
//! GET  /admin/order  PUT /admin/order/{id}/status
//! POST /admin/order/{id}/courier  /admin/order/{id}/courier/refresh
//! PUT  /admin/transaction/{id}/status
//! GET  /admin/user  /admin/corporate
//! POST /admin/corporate/{id}/approve|reject  DELETE /admin/user/{id}
//! GET  /courier/status/{kind}/{value}
//! ```

pub mod admin;
pub mod auth;
pub mod categories;
pub mod checkout;
pub mod courier;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod shops;

use axum::Router;

use crate::state::AppState;

/// Every `/api` route.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/category", categories::router())
        .nest("/product", products::router())
        .nest("/review", reviews::router())
        .nest("/shop", shops::router())
        .nest("/checkout", checkout::router())
        .nest("/order", orders::router())
        .nest("/admin", admin::router())
        .nest("/courier", courier::router())
}
