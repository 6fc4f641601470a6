//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bazaar_core::{
    CustomerId, OrderDetailId, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId,
    ShippingZone, ShopId, TransactionId, TransactionStatus, UserId,
};

/// Shipping contact captured at checkout.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub address: String,
    pub city: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An order header.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub customer_id: CustomerId,
    pub shop_id: Option<ShopId>,
    /// Only handed out once, in the checkout response.
    #[serde(skip)]
    pub guest_token: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipping_zone: ShippingZone,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_charge: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub courier_consignment_id: Option<i64>,
    pub courier_tracking_code: Option<String>,
    pub courier_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One priced line of an order, frozen at placement time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderDetail {
    pub id: OrderDetailId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_discount: Decimal,
    pub line_total: Decimal,
}

/// A payment record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order with its customer and lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: Order,
    pub customer: Customer,
    pub details: Vec<OrderDetail>,
}

impl Order {
    /// Whether `user` may see this order.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.user_id == Some(user)
    }
}
