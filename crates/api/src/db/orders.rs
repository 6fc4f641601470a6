//! Order repository: customers, orders, order details and transactions.
//!
//! Writes that must be atomic with stock changes are free functions over a
//! caller-owned connection; [`OrderRepository`] covers pool-backed reads and
//! single-statement updates.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use bazaar_core::{
    CustomerId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, QuoteLine, ShippingZone,
    ShopId, TransactionId, TransactionStatus, UserId,
};

use super::{Page, RepositoryError};
use crate::models::{Customer, Order, OrderDetail, OrderWithDetails, Transaction};

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_id, shop_id, guest_token, \
     status, payment_method, payment_status, shipping_zone, subtotal, discount_total, \
     shipping_charge, total, note, courier_consignment_id, courier_tracking_code, \
     courier_status, created_at, updated_at";

const CUSTOMER_COLUMNS: &str = "id, user_id, name, email, phone, address, city, created_at";

const DETAIL_COLUMNS: &str = "id, order_id, product_id, product_name, sku, quantity, \
     unit_price, unit_discount, line_total";

const TRANSACTION_COLUMNS: &str =
    "id, order_id, amount, method, status, reference, created_at, updated_at";

/// Contact details for a new customer row.
#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    pub user_id: Option<UserId>,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub phone: &'a str,
    pub address: &'a str,
    pub city: Option<&'a str>,
}

/// Header fields for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub order_number: &'a str,
    pub user_id: Option<UserId>,
    pub customer_id: CustomerId,
    pub shop_id: Option<ShopId>,
    pub guest_token: Option<&'a str>,
    pub payment_method: PaymentMethod,
    pub shipping_zone: ShippingZone,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_charge: Decimal,
    pub total: Decimal,
    pub note: Option<&'a str>,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Insert a customer row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_customer(
    conn: &mut PgConnection,
    customer: &NewCustomer<'_>,
) -> Result<Customer, RepositoryError> {
    let row = sqlx::query_as::<_, Customer>(&format!(
        "INSERT INTO customers (user_id, name, email, phone, address, city) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {CUSTOMER_COLUMNS}"
    ))
    .bind(customer.user_id)
    .bind(customer.name)
    .bind(customer.email)
    .bind(customer.phone)
    .bind(customer.address)
    .bind(customer.city)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Insert an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order number or guest token is taken.
/// Returns `RepositoryError::Database` for other database errors.
pub async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder<'_>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (order_number, user_id, customer_id, shop_id, guest_token, \
             payment_method, shipping_zone, subtotal, discount_total, shipping_charge, total, note) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order.order_number)
    .bind(order.user_id)
    .bind(order.customer_id)
    .bind(order.shop_id)
    .bind(order.guest_token)
    .bind(order.payment_method)
    .bind(order.shipping_zone)
    .bind(order.subtotal)
    .bind(order.discount_total)
    .bind(order.shipping_charge)
    .bind(order.total)
    .bind(order.note)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::unique_or(e, "order number or guest token collision"))?;
    Ok(row)
}

/// Insert the priced lines of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_details(
    conn: &mut PgConnection,
    order_id: OrderId,
    lines: &[QuoteLine],
) -> Result<Vec<OrderDetail>, RepositoryError> {
    let mut details = Vec::with_capacity(lines.len());
    for line in lines {
        let detail = sqlx::query_as::<_, OrderDetail>(&format!(
            "INSERT INTO order_details (order_id, product_id, product_name, sku, quantity, \
                 unit_price, unit_discount, line_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {DETAIL_COLUMNS}"
        ))
        .bind(order_id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(&line.sku)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.unit_discount)
        .bind(line.line_total)
        .fetch_one(&mut *conn)
        .await?;
        details.push(detail);
    }
    Ok(details)
}

/// Record a pending payment for an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn insert_transaction(
    conn: &mut PgConnection,
    order_id: OrderId,
    amount: Decimal,
    method: PaymentMethod,
) -> Result<Transaction, RepositoryError> {
    let row = sqlx::query_as::<_, Transaction>(&format!(
        "INSERT INTO transactions (order_id, amount, method) \
         VALUES ($1, $2, $3) RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(order_id)
    .bind(amount)
    .bind(method)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Lock an order row for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_order(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Lines of an order, read on the caller's connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn details_on(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderDetail>, RepositoryError> {
    let rows = sqlx::query_as::<_, OrderDetail>(&format!(
        "SELECT {DETAIL_COLUMNS} FROM order_details WHERE order_id = $1 ORDER BY id"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Set an order's fulfilment status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Set an order's payment status.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn set_payment_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: PaymentStatus,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE orders SET payment_status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark every pending transaction of an order as failed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn fail_pending_transactions(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        "UPDATE transactions SET status = 'failed' WHERE order_id = $1 AND status = 'pending'",
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Lock a transaction row for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_transaction(
    conn: &mut PgConnection,
    id: TransactionId,
) -> Result<Option<Transaction>, RepositoryError> {
    let row = sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Set a transaction's status and, optionally, its payment reference.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn set_transaction_status(
    conn: &mut PgConnection,
    id: TransactionId,
    status: TransactionStatus,
    reference: Option<&str>,
) -> Result<Transaction, RepositoryError> {
    let row = sqlx::query_as::<_, Transaction>(&format!(
        "UPDATE transactions SET status = $2, reference = COALESCE($3, reference) \
         WHERE id = $1 RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(reference)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads and single-statement updates.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a live order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Get a live order by its guest tracking token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip_all)]
    pub async fn get_by_guest_token(&self, token: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE guest_token = $1 AND deleted_at IS NULL"
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Attach the customer and lines to an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DataCorruption` if the customer row is missing.
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn with_details(&self, order: Order) -> Result<OrderWithDetails, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(order.customer_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| {
            RepositoryError::DataCorruption(format!("order {} has no customer", order.id))
        })?;

        let details = sqlx::query_as::<_, OrderDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM order_details WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.id)
        .fetch_all(self.pool)
        .await?;

        Ok(OrderWithDetails {
            order,
            customer,
            details,
        })
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok((rows, total))
    }

    /// All orders, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: Page,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let rows = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE deleted_at IS NULL AND ($1::order_status IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders \
             WHERE deleted_at IS NULL AND ($1::order_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Payment records of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn transactions(&self, order_id: OrderId) -> Result<Vec<Transaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Store the courier booking for an order that has none yet.
    ///
    /// Returns `None` when the order is missing or already carries a
    /// consignment, so concurrent bookings cannot overwrite each other.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn set_courier_booking(
        &self,
        id: OrderId,
        consignment_id: i64,
        tracking_code: &str,
        courier_status: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET courier_consignment_id = $2, courier_tracking_code = $3, \
                 courier_status = $4 \
             WHERE id = $1 AND courier_consignment_id IS NULL \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(consignment_id)
        .bind(tracking_code)
        .bind(courier_status)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Store the latest courier delivery status for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn set_courier_status(
        &self,
        id: OrderId,
        courier_status: &str,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET courier_status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(courier_status)
        .fetch_optional(self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound)
    }
}
