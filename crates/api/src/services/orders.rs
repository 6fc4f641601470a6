//! Order lifecycle: tracking, status changes, payments and courier booking.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use bazaar_core::{
    GuestToken, OrderId, OrderStatus, PaymentStatus, TransactionId, TransactionStatus, UserId,
};

use crate::db::orders::{self as order_tx, OrderRepository};
use crate::db::products::restore_stock;
use crate::db::{Page, RepositoryError};
use crate::models::{Customer, Order, OrderWithDetails, Transaction, User};
use crate::services::courier::{ConsignmentRequest, CourierError, SteadfastClient};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    /// The viewer neither owns the order nor is staff.
    #[error("not allowed to access this order")]
    Forbidden,

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("courier integration is not configured")]
    CourierDisabled,

    #[error("order is already booked as consignment {0}")]
    AlreadyBooked(i64),

    #[error("order has not been booked with the courier")]
    NotBooked,

    #[error("cancelled orders cannot be shipped")]
    Cancelled,

    #[error("courier error: {0}")]
    Courier(#[from] CourierError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    courier: Option<&'a SteadfastClient>,
}

impl<'a> OrderService<'a> {
    /// Create a new order service. Courier calls fail with
    /// `OrderError::CourierDisabled` when `courier` is `None`.
    #[must_use]
    pub const fn new(pool: &'a PgPool, courier: Option<&'a SteadfastClient>) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            courier,
        }
    }

    /// Look up a guest order by its tracking token.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the token is malformed or unknown.
    #[instrument(skip_all)]
    pub async fn track(&self, token: &str) -> Result<OrderWithDetails, OrderError> {
        let token = GuestToken::parse(token).map_err(|_| OrderError::NotFound)?;
        let order = self
            .orders
            .get_by_guest_token(token.as_str())
            .await?
            .ok_or(OrderError::NotFound)?;
        Ok(self.orders.with_details(order).await?)
    }

    /// A user's own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list_mine(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<(Vec<Order>, i64), OrderError> {
        Ok(self.orders.list_for_user(user_id, page).await?)
    }

    /// All orders, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<Order>, i64), OrderError> {
        Ok(self.orders.list(status, page).await?)
    }

    /// An order with its lines, for its owner or staff.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    /// Returns `OrderError::Forbidden` if `viewer` may not see it.
    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn show(&self, id: OrderId, viewer: &User) -> Result<OrderWithDetails, OrderError> {
        let order = self.visible_order(id, viewer).await?;
        Ok(self.orders.with_details(order).await?)
    }

    /// Payment records of an order, for its owner or staff.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    /// Returns `OrderError::Forbidden` if `viewer` may not see it.
    #[instrument(skip(self, viewer), fields(viewer_id = %viewer.id))]
    pub async fn transactions(
        &self,
        id: OrderId,
        viewer: &User,
    ) -> Result<Vec<Transaction>, OrderError> {
        let order = self.visible_order(id, viewer).await?;
        Ok(self.orders.transactions(order.id).await?)
    }

    async fn visible_order(&self, id: OrderId, viewer: &User) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if viewer.is_admin() || order.is_owned_by(viewer.id) {
            Ok(order)
        } else {
            Err(OrderError::Forbidden)
        }
    }

    /// Move an order to `next`.
    ///
    /// Cancelling puts every line back into stock and fails the order's
    /// pending payments, all in the same transaction as the status change.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    /// Returns `OrderError::InvalidTransition` if `next` is not reachable.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, next: OrderStatus) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let order = order_tx::lock_order(&mut tx, id)
            .await?
            .ok_or(OrderError::NotFound)?;

        if !order.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }

        if next == OrderStatus::Cancelled {
            let details = order_tx::details_on(&mut tx, id).await?;
            for detail in &details {
                restore_stock(&mut tx, detail.product_id, detail.quantity).await?;
            }
            let failed = order_tx::fail_pending_transactions(&mut tx, id).await?;
            tracing::info!(
                order_id = %id,
                lines_restocked = details.len(),
                transactions_failed = failed,
                "Order cancelled"
            );
        }

        let updated = order_tx::set_status(&mut tx, id, next).await?;
        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(order_id = %id, from = %order.status, to = %next, "Order status changed");
        Ok(updated)
    }

    /// Set a payment's status and carry it over to the order.
    ///
    /// `completed` marks the order paid and `refunded` marks it refunded.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::TransactionNotFound` if the transaction does not exist.
    #[instrument(skip(self))]
    pub async fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        reference: Option<&str>,
    ) -> Result<Transaction, OrderError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let current = order_tx::lock_transaction(&mut tx, id)
            .await?
            .ok_or(OrderError::TransactionNotFound)?;

        let updated = order_tx::set_transaction_status(&mut tx, id, status, reference).await?;
        if let Some(payment_status) = status.implied_payment_status() {
            order_tx::set_payment_status(&mut tx, current.order_id, payment_status).await?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        tracing::info!(
            transaction_id = %id,
            order_id = %current.order_id,
            from = %current.status,
            to = %status,
            "Transaction status changed"
        );
        Ok(updated)
    }

    /// Book an existing order with the courier.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::CourierDisabled` without courier credentials.
    /// Returns `OrderError::NotFound`, `AlreadyBooked` or `Cancelled` when the
    /// order cannot be booked, and `OrderError::Courier` when the API fails.
    #[instrument(skip(self))]
    pub async fn book_courier(&self, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        let order = self.orders.with_details(order).await?;
        self.book(&order).await
    }

    /// Book a freshly loaded order with the courier and store the consignment.
    ///
    /// # Errors
    ///
    /// Same as [`Self::book_courier`], minus the lookup.
    pub async fn book(&self, order: &OrderWithDetails) -> Result<Order, OrderError> {
        let courier = self.courier.ok_or(OrderError::CourierDisabled)?;
        let header = &order.order;

        if let Some(consignment_id) = header.courier_consignment_id {
            return Err(OrderError::AlreadyBooked(consignment_id));
        }
        if header.status == OrderStatus::Cancelled {
            return Err(OrderError::Cancelled);
        }

        let address = recipient_address(&order.customer);
        let request = ConsignmentRequest {
            invoice: &header.order_number,
            recipient_name: &order.customer.name,
            recipient_phone: &order.customer.phone,
            recipient_address: &address,
            cod_amount: cod_amount(header),
            note: header.note.as_deref(),
        };

        let consignment = courier.create_order(&request).await?;
        if let Some(updated) = self
            .orders
            .set_courier_booking(
                header.id,
                consignment.consignment_id,
                &consignment.tracking_code,
                &consignment.status,
            )
            .await?
        {
            return Ok(updated);
        }

        // Another booking for this order committed first.
        let current = self.orders.get(header.id).await?.ok_or(OrderError::NotFound)?;
        let kept = current.courier_consignment_id.ok_or(OrderError::NotFound)?;
        tracing::warn!(
            order_id = %header.id,
            kept_consignment_id = kept,
            duplicate_consignment_id = consignment.consignment_id,
            "Order was booked concurrently, duplicate consignment must be cancelled with the courier"
        );
        Err(OrderError::AlreadyBooked(kept))
    }

    /// Fetch the latest delivery status from the courier and store it.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::CourierDisabled` without courier credentials.
    /// Returns `OrderError::NotBooked` if the order has no consignment.
    /// Returns `OrderError::Courier` when the API fails.
    #[instrument(skip(self))]
    pub async fn refresh_courier_status(&self, id: OrderId) -> Result<Order, OrderError> {
        let courier = self.courier.ok_or(OrderError::CourierDisabled)?;
        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        let consignment_id = order.courier_consignment_id.ok_or(OrderError::NotBooked)?;

        let status = courier.status_by_consignment_id(consignment_id).await?;
        tracing::info!(order_id = %id, courier_status = %status, "Courier status refreshed");
        Ok(self.orders.set_courier_status(id, &status).await?)
    }
}

/// Amount the rider should collect: the total for unpaid cash-on-delivery
/// orders, zero otherwise.
fn cod_amount(order: &Order) -> Decimal {
    if order.payment_method.collects_on_delivery() && order.payment_status == PaymentStatus::Unpaid
    {
        order.total
    } else {
        Decimal::ZERO
    }
}

fn recipient_address(customer: &Customer) -> String {
    match customer.city.as_deref() {
        Some(city) if !customer.address.contains(city) => format!("{}, {city}", customer.address),
        _ => customer.address.clone(),
    }
}
