//! Checkout: price a cart and turn it into an order.
//!
//! Placement runs in one database transaction. Product rows are locked
//! `FOR UPDATE` in ID order, priced with [`bazaar_core::quote`], and only then
//! is stock taken out, so two checkouts racing for the last unit cannot both
//! succeed. The courier is called after commit; a courier failure never
//! undoes an order.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::instrument;

use bazaar_core::{
    Email, GuestToken, OrderNumber, PaymentMethod, ProductId, Quote, QuoteError,
    QuoteRequestLine, ShippingZone, ShopId, quote,
    pricing::MAX_LINE_QUANTITY,
};

use crate::config::ShippingConfig;
use crate::db::orders::{self as order_tx, NewCustomer, NewOrder};
use crate::db::products::{self, ProductRepository};
use crate::db::{RepositoryError, shops};
use crate::error::add_breadcrumb;
use crate::models::{OrderWithDetails, Product, Transaction, User};
use crate::services::courier::SteadfastClient;
use crate::services::orders::OrderService;
use crate::validation::{FieldErrors, is_valid_phone, optional_text, required_text};

/// Attempts made when a generated order number or guest token collides.
const MAX_PLACEMENT_ATTEMPTS: u32 = 3;

/// Errors from quoting or placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(FieldErrors),

    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// Some requested products do not exist (or were deleted).
    #[error("unknown products: {0:?}")]
    UnknownProducts(Vec<ProductId>),

    #[error("shop does not exist")]
    UnknownShop,

    /// The chosen shop does not sell some of the requested products.
    #[error("shop does not carry products: {0:?}")]
    NotCarriedByShop(Vec<ProductId>),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// One requested cart line.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Body of `POST /api/checkout/quote`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub shipping_zone: ShippingZone,
}

/// Body of `POST /api/checkout`.
///
/// Text fields default to empty so that missing ones are reported as field
/// errors rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub shipping_zone: ShippingZone,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub shop_id: Option<ShopId>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Contact details that passed validation.
#[derive(Debug, Clone)]
struct ContactDetails {
    name: String,
    email: Option<Email>,
    phone: String,
    address: String,
    city: Option<String>,
    note: Option<String>,
}

impl CheckoutRequest {
    fn validate(&self) -> Result<ContactDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_items(&self.items, &mut errors);

        let name = required_text(&mut errors, "name", &self.name);
        let address = required_text(&mut errors, "address", &self.address);
        let phone = self.phone.trim().to_owned();
        errors.check(
            !is_valid_phone(&phone),
            "phone",
            "phone must be 7-20 digits, spaces, + or -",
        );

        let email = match optional_text(self.email.as_deref()) {
            Some(raw) => match Email::parse(&raw) {
                Ok(email) => Some(email),
                Err(_) => {
                    errors.add("email", "email must be a valid email address");
                    None
                }
            },
            None => None,
        };

        errors.into_result()?;
        Ok(ContactDetails {
            name,
            email,
            phone,
            address,
            city: optional_text(self.city.as_deref()),
            note: optional_text(self.note.as_deref()),
        })
    }
}

/// Record cart shape problems: empty cart, quantity range, duplicate IDs.
fn validate_items(items: &[CheckoutItem], errors: &mut FieldErrors) {
    if items.is_empty() {
        errors.add("items", "at least one item is required");
        return;
    }

    let mut seen = HashSet::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if !(1..=MAX_LINE_QUANTITY).contains(&item.quantity) {
            errors.add(
                format!("items.{i}.quantity"),
                format!("quantity must be between 1 and {MAX_LINE_QUANTITY}"),
            );
        }
        if !seen.insert(item.product_id) {
            errors.add(format!("items.{i}.product_id"), "product is listed more than once");
        }
    }
}

/// Pair requested items with their product rows, in request order.
fn request_lines(
    items: &[CheckoutItem],
    products: Vec<Product>,
) -> Result<Vec<QuoteRequestLine>, CheckoutError> {
    let mut by_id: HashMap<ProductId, Product> =
        products.into_iter().map(|p| (p.id, p)).collect();

    let missing: Vec<ProductId> = items
        .iter()
        .map(|item| item.product_id)
        .filter(|id| !by_id.contains_key(id))
        .collect();
    if !missing.is_empty() {
        return Err(CheckoutError::UnknownProducts(missing));
    }

    Ok(items
        .iter()
        .filter_map(|item| {
            by_id.remove(&item.product_id).map(|product| QuoteRequestLine {
                product: product.snapshot(),
                quantity: item.quantity,
            })
        })
        .collect())
}

fn sorted_ids(items: &[CheckoutItem]) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// A placed order as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: OrderWithDetails,
    pub transaction: Transaction,
    /// Guest checkouts only. Shown once; needed to track the order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    shipping: ShippingConfig,
    orders: OrderService<'a>,
    courier_enabled: bool,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        shipping: ShippingConfig,
        courier: Option<&'a SteadfastClient>,
    ) -> Self {
        Self {
            pool,
            shipping,
            orders: OrderService::new(pool, courier),
            courier_enabled: courier.is_some(),
        }
    }

    /// Price a cart at current prices without reserving anything.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for a malformed cart,
    /// `CheckoutError::UnknownProducts` for missing products and
    /// `CheckoutError::Quote` when a product is unavailable or short.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<Quote, CheckoutError> {
        let mut errors = FieldErrors::new();
        validate_items(&request.items, &mut errors);
        errors.into_result().map_err(CheckoutError::Validation)?;

        let products = ProductRepository::new(self.pool)
            .get_many(&sorted_ids(&request.items))
            .await?;
        let lines = request_lines(&request.items, products)?;

        Ok(quote(
            &lines,
            self.shipping.charge_for(request.shipping_zone),
            Utc::now(),
        )?)
    }

    /// Place an order.
    ///
    /// `user` is the signed-in customer, if any. Guest orders get a tracking
    /// token, returned only in this response.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for invalid contact details or cart,
    /// `CheckoutError::UnknownShop` / `NotCarriedByShop` for a bad shop,
    /// `CheckoutError::UnknownProducts` for missing products and
    /// `CheckoutError::Quote` when a product is unavailable or out of stock.
    /// Nothing is written when an error is returned.
    #[instrument(
        skip(self, request, user),
        fields(lines = request.items.len(), user_id = ?user.map(|u| u.id))
    )]
    pub async fn place(
        &self,
        request: &CheckoutRequest,
        user: Option<&User>,
    ) -> Result<PlacedOrder, CheckoutError> {
        let contact = request.validate().map_err(CheckoutError::Validation)?;

        let mut attempt = 1;
        let mut placed = loop {
            match self.try_place(request, &contact, user).await {
                Err(CheckoutError::Repository(RepositoryError::Conflict(reason)))
                    if attempt < MAX_PLACEMENT_ATTEMPTS =>
                {
                    tracing::warn!(attempt, %reason, "Order identifier collision, retrying");
                    attempt += 1;
                }
                result => break result?,
            }
        };

        tracing::info!(
            order_id = %placed.order.order.id,
            order_number = %placed.order.order.order_number,
            total = %placed.order.order.total,
            guest = placed.guest_token.is_some(),
            "Order placed"
        );

        self.book_courier(&mut placed).await;
        Ok(placed)
    }

    async fn try_place(
        &self,
        request: &CheckoutRequest,
        contact: &ContactDetails,
        user: Option<&User>,
    ) -> Result<PlacedOrder, CheckoutError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if let Some(shop_id) = request.shop_id {
            check_shop(&mut tx, shop_id, &sorted_ids(&request.items)).await?;
        }

        let products = products::lock_for_update(&mut tx, &sorted_ids(&request.items)).await?;
        let lines = request_lines(&request.items, products)?;
        let quote = quote(
            &lines,
            self.shipping.charge_for(request.shipping_zone),
            now,
        )?;

        for (line, requested) in quote.lines.iter().zip(&lines) {
            if !products::decrement_stock(&mut tx, line.product_id, line.quantity).await? {
                return Err(QuoteError::InsufficientStock {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available: requested.product.stock.max(0),
                }
                .into());
            }
        }

        let user_id = user.map(|u| u.id);
        let customer = order_tx::insert_customer(
            &mut tx,
            &NewCustomer {
                user_id,
                name: &contact.name,
                email: contact.email.as_ref().map(Email::as_str),
                phone: &contact.phone,
                address: &contact.address,
                city: contact.city.as_deref(),
            },
        )
        .await?;

        let order_number = OrderNumber::generate(now);
        let guest_token = user.is_none().then(GuestToken::generate);
        let order = order_tx::insert_order(
            &mut tx,
            &NewOrder {
                order_number: order_number.as_str(),
                user_id,
                customer_id: customer.id,
                shop_id: request.shop_id,
                guest_token: guest_token.as_ref().map(GuestToken::as_str),
                payment_method: request.payment_method,
                shipping_zone: request.shipping_zone,
                subtotal: quote.subtotal,
                discount_total: quote.discount_total,
                shipping_charge: quote.shipping_charge,
                total: quote.total,
                note: contact.note.as_deref(),
            },
        )
        .await?;

        let details = order_tx::insert_details(&mut tx, order.id, &quote.lines).await?;
        let transaction =
            order_tx::insert_transaction(&mut tx, order.id, quote.total, request.payment_method)
                .await?;

        tx.commit().await?;

        Ok(PlacedOrder {
            order: OrderWithDetails {
                order,
                customer,
                details,
            },
            transaction,
            guest_token: guest_token.map(|t| t.as_str().to_owned()),
        })
    }

    /// Book the parcel after commit. Failures are logged and the order stands.
    async fn book_courier(&self, placed: &mut PlacedOrder) {
        let order_number = placed.order.order.order_number.clone();
        if !self.courier_enabled {
            tracing::info!(%order_number, "Courier not configured, skipping booking");
            return;
        }

        match self.orders.book(&placed.order).await {
            Ok(order) => {
                tracing::info!(
                    %order_number,
                    consignment_id = ?order.courier_consignment_id,
                    "Courier booked"
                );
                placed.order.order = order;
            }
            Err(err) => {
                tracing::warn!(%order_number, error = %err, "Courier booking failed, order kept");
                let reason = err.to_string();
                add_breadcrumb(
                    "courier",
                    "Courier booking failed",
                    Some(&[("order_number", order_number.as_str()), ("error", reason.as_str())]),
                );
            }
        }
    }
}

async fn check_shop(
    conn: &mut PgConnection,
    shop_id: ShopId,
    product_ids: &[ProductId],
) -> Result<(), CheckoutError> {
    if !shops::exists(conn, shop_id).await? {
        return Err(CheckoutError::UnknownShop);
    }
    let missing = shops::products_not_carried(conn, shop_id, product_ids).await?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CheckoutError::NotCarriedByShop(missing))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use bazaar_core::{Discount, Sku};

    use super::*;

    fn request(items: Vec<CheckoutItem>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            name: "Rahim Uddin".to_owned(),
            email: Some("rahim@example.com".to_owned()),
            phone: "+880 1711-000000".to_owned(),
            address: "House 4, Road 7".to_owned(),
            city: Some("Dhaka".to_owned()),
            shipping_zone: ShippingZone::InsideCity,
            payment_method: PaymentMethod::CashOnDelivery,
            shop_id: None,
            note: Some("  ".to_owned()),
        }
    }

    fn item(id: i32, quantity: i32) -> CheckoutItem {
        CheckoutItem {
            product_id: ProductId::new(id),
            quantity,
        }
    }

    fn product(id: i32) -> Product {
        Product {
            id: ProductId::new(id),
            category_id: None,
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            sku: Sku::parse(&format!("SKU-{id}")).unwrap(),
            description: None,
            price: Decimal::from(100),
            discount: Discount::none(),
            stock: 5,
            is_active: true,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_request_normalizes_contact() {
        let contact = request(vec![item(1, 2)]).validate().unwrap();
        assert_eq!(contact.name, "Rahim Uddin");
        assert_eq!(contact.email.unwrap().as_str(), "rahim@example.com");
        assert!(contact.note.is_none());
    }

    #[test]
    fn test_validation_collects_every_field() {
        let mut req = request(vec![item(1, 0), item(1, 101)]);
        req.name = "  ".to_owned();
        req.phone = "12ab".to_owned();
        req.email = Some("not-an-email".to_owned());
        req.address = String::new();

        let errors = req.validate().unwrap_err();
        for field in [
            "name",
            "phone",
            "email",
            "address",
            "items.0.quantity",
            "items.1.quantity",
            "items.1.product_id",
        ] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn test_empty_cart_is_rejected() {
        let errors = request(vec![]).validate().unwrap_err();
        assert!(errors.get("items").is_some());
    }

    #[test]
    fn test_blank_email_is_optional() {
        let mut req = request(vec![item(1, 1)]);
        req.email = Some(String::new());
        assert!(req.validate().unwrap().email.is_none());
    }

    #[test]
    fn test_request_lines_keep_request_order() {
        let lines =
            request_lines(&[item(2, 1), item(1, 3)], vec![product(1), product(2)]).unwrap();
        assert_eq!(lines[0].product.id, ProductId::new(2));
        assert_eq!(lines[1].product.id, ProductId::new(1));
        assert_eq!(lines[1].quantity, 3);
    }

    #[test]
    fn test_request_lines_report_unknown_products() {
        let err = request_lines(&[item(1, 1), item(9, 1)], vec![product(1)]).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::UnknownProducts(ids) if ids == vec![ProductId::new(9)]
        ));
    }

    #[test]
    fn test_sorted_ids_dedups() {
        assert_eq!(
            sorted_ids(&[item(3, 1), item(1, 1), item(3, 2)]),
            vec![ProductId::new(1), ProductId::new(3)]
        );
    }

    #[test]
    fn test_checkout_request_defaults() {
        let req: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "items": [{"product_id": 1, "quantity": 2}],
            "name": "A",
            "phone": "01711000000",
            "address": "Somewhere"
        }))
        .unwrap();
        assert_eq!(req.shipping_zone, ShippingZone::InsideCity);
        assert_eq!(req.payment_method, PaymentMethod::CashOnDelivery);
        assert!(req.shop_id.is_none());
    }
}
