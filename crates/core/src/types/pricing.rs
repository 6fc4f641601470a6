//! Product pricing and checkout quotes.
//!
//! Prices are `Decimal` amounts in the store currency, always rounded to two
//! decimal places with midpoint-away-from-zero rounding.
//!
//! A product carries at most one [`Discount`]: a percentage or a fixed amount,
//! optionally restricted to a date window. [`quote`] turns a list of products
//! and requested quantities into priced lines and order totals, checking
//! availability along the way. It does no I/O, so the checkout service calls it
//! with rows it has already locked.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// Largest quantity accepted for a single checkout line.
pub const MAX_LINE_QUANTITY: i32 = 100;

/// Round a money amount to cents.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// How a product discount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "discount_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[default]
    None,
    /// `value` is a percentage of the list price (0-100).
    Percent,
    /// `value` is an amount subtracted from the list price.
    Fixed,
}

/// Errors from [`Discount::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountError {
    #[error("discount value cannot be negative")]
    Negative,
    #[error("percentage discount cannot exceed 100")]
    PercentTooLarge,
    #[error("discount window must start before it ends")]
    InvalidWindow,
}

/// A product discount with an optional validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Discount {
    /// Discount kind.
    #[serde(rename = "type")]
    pub kind: DiscountType,
    /// Percentage or fixed amount, depending on `kind`.
    pub value: Decimal,
    /// First instant the discount applies (inclusive).
    pub starts_at: Option<DateTime<Utc>>,
    /// Last instant the discount applies (inclusive).
    pub ends_at: Option<DateTime<Utc>>,
}

impl Discount {
    /// A discount that never applies.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            kind: DiscountType::None,
            value: Decimal::ZERO,
            starts_at: None,
            ends_at: None,
        }
    }

    /// Check the discount is well formed.
    ///
    /// # Errors
    ///
    /// Returns an error for negative values, percentages above 100, or a
    /// window whose start is not before its end.
    pub fn validate(&self) -> Result<(), DiscountError> {
        if self.value.is_sign_negative() && !self.value.is_zero() {
            return Err(DiscountError::Negative);
        }
        if self.kind == DiscountType::Percent && self.value > Decimal::ONE_HUNDRED {
            return Err(DiscountError::PercentTooLarge);
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at)
            && start >= end
        {
            return Err(DiscountError::InvalidWindow);
        }
        Ok(())
    }

    /// Whether the discount applies at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.kind == DiscountType::None || self.value <= Decimal::ZERO {
            return false;
        }
        let started = self.starts_at.is_none_or(|start| start <= now);
        let not_ended = self.ends_at.is_none_or(|end| now <= end);
        started && not_ended
    }

    /// Amount taken off `price` at `now`, never more than `price` itself.
    #[must_use]
    pub fn amount_off(&self, price: Decimal, now: DateTime<Utc>) -> Decimal {
        if !self.is_active(now) || price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let off = match self.kind {
            DiscountType::None => Decimal::ZERO,
            DiscountType::Percent => {
                price * self.value.min(Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED
            }
            DiscountType::Fixed => self.value,
        };
        round_money(off.min(price))
    }
}

/// List price, discount and final price of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Price before discount.
    pub list_price: Decimal,
    /// Discount per unit.
    pub discount: Decimal,
    /// `list_price - discount`.
    pub final_price: Decimal,
}

/// Price one unit of a product at `now`.
#[must_use]
pub fn unit_price(price: Decimal, discount: &Discount, now: DateTime<Utc>) -> PriceBreakdown {
    let list_price = round_money(price);
    let discount = discount.amount_off(list_price, now);
    PriceBreakdown {
        list_price,
        discount,
        final_price: list_price - discount,
    }
}

/// The product fields checkout pricing depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub discount: Discount,
    pub stock: i32,
    pub is_active: bool,
}

/// A product and the quantity requested for it.
#[derive(Debug, Clone)]
pub struct QuoteRequestLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
}

/// One priced checkout line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub unit_discount: Decimal,
    pub line_total: Decimal,
}

/// Priced lines and order totals.
///
/// `total == subtotal - discount_total + shipping_charge` and
/// `subtotal - discount_total` equals the sum of `line_total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub item_count: i32,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_charge: Decimal,
    pub total: Decimal,
}

/// Reasons a set of lines cannot be priced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("quantity for product {product_id} must be between 1 and 100, got {quantity}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },
    #[error("product {0} appears more than once")]
    DuplicateProduct(ProductId),
    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },
    #[error("shipping charge cannot be negative")]
    NegativeShipping,
}

/// Price a checkout.
///
/// # Errors
///
/// Returns the first problem found, checking in order: empty cart, negative
/// shipping, then per line quantity range, duplicates, availability and stock.
pub fn quote(
    lines: &[QuoteRequestLine],
    shipping_charge: Decimal,
    now: DateTime<Utc>,
) -> Result<Quote, QuoteError> {
    if lines.is_empty() {
        return Err(QuoteError::EmptyCart);
    }
    if shipping_charge.is_sign_negative() && !shipping_charge.is_zero() {
        return Err(QuoteError::NegativeShipping);
    }

    let mut seen = HashSet::with_capacity(lines.len());
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Decimal::ZERO;
    let mut discount_total = Decimal::ZERO;
    let mut item_count = 0;

    for line in lines {
        let product = &line.product;
        if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            return Err(QuoteError::InvalidQuantity {
                product_id: product.id,
                quantity: line.quantity,
            });
        }
        if !seen.insert(product.id) {
            return Err(QuoteError::DuplicateProduct(product.id));
        }
        if !product.is_active {
            return Err(QuoteError::ProductUnavailable(product.id));
        }
        if product.stock < line.quantity {
            return Err(QuoteError::InsufficientStock {
                product_id: product.id,
                requested: line.quantity,
                available: product.stock.max(0),
            });
        }

        let unit = unit_price(product.price, &product.discount, now);
        let quantity = Decimal::from(line.quantity);
        subtotal += unit.list_price * quantity;
        discount_total += unit.discount * quantity;
        item_count += line.quantity;

        priced.push(QuoteLine {
            product_id: product.id,
            product_name: product.name.clone(),
            sku: product.sku.clone(),
            quantity: line.quantity,
            unit_price: unit.list_price,
            unit_discount: unit.discount,
            line_total: unit.final_price * quantity,
        });
    }

    let shipping_charge = round_money(shipping_charge);
    Ok(Quote {
        lines: priced,
        item_count,
        subtotal,
        discount_total,
        shipping_charge,
        total: subtotal - discount_total + shipping_charge,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
    }

    fn product(id: i32, price: Decimal, discount: Discount, stock: i32) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            sku: format!("SKU-{id}"),
            price,
            discount,
            stock,
            is_active: true,
        }
    }

    fn percent(value: Decimal) -> Discount {
        Discount {
            kind: DiscountType::Percent,
            value,
            starts_at: None,
            ends_at: None,
        }
    }

    fn fixed(value: Decimal) -> Discount {
        Discount {
            kind: DiscountType::Fixed,
            value,
            starts_at: None,
            ends_at: None,
        }
    }

    #[test]
    fn test_percent_discount() {
        let p = unit_price(d("250.00"), &percent(d("10")), now());
        assert_eq!(p.discount, d("25.00"));
        assert_eq!(p.final_price, d("225.00"));
    }

    #[test]
    fn test_percent_discount_rounds_to_cents() {
        // 33% of 9.99 = 3.2967
        let p = unit_price(d("9.99"), &percent(d("33")), now());
        assert_eq!(p.discount, d("3.30"));
        assert_eq!(p.final_price, d("6.69"));
    }

    #[test]
    fn test_fixed_discount_capped_at_price() {
        let p = unit_price(d("40"), &fixed(d("55")), now());
        assert_eq!(p.discount, d("40"));
        assert_eq!(p.final_price, Decimal::ZERO);
    }

    #[test]
    fn test_discount_window() {
        let mut discount = fixed(d("5"));
        discount.starts_at = Some(now() + Duration::days(1));
        assert!(!discount.is_active(now()));
        assert_eq!(unit_price(d("20"), &discount, now()).final_price, d("20"));

        discount.starts_at = Some(now() - Duration::days(2));
        discount.ends_at = Some(now() - Duration::days(1));
        assert!(!discount.is_active(now()));

        discount.ends_at = Some(now());
        assert!(discount.is_active(now()), "end of window is inclusive");
    }

    #[test]
    fn test_none_discount_never_applies() {
        let discount = Discount {
            kind: DiscountType::None,
            value: d("50"),
            starts_at: None,
            ends_at: None,
        };
        assert_eq!(discount.amount_off(d("100"), now()), Decimal::ZERO);
    }

    #[test]
    fn test_validate_discount() {
        assert!(percent(d("100")).validate().is_ok());
        assert_eq!(
            percent(d("101")).validate(),
            Err(DiscountError::PercentTooLarge)
        );
        assert_eq!(fixed(d("-1")).validate(), Err(DiscountError::Negative));

        let mut window = fixed(d("1"));
        window.starts_at = Some(now());
        window.ends_at = Some(now());
        assert_eq!(window.validate(), Err(DiscountError::InvalidWindow));
    }

    #[test]
    fn test_quote_totals() {
        let lines = vec![
            QuoteRequestLine {
                product: product(1, d("100"), percent(d("10")), 5),
                quantity: 2,
            },
            QuoteRequestLine {
                product: product(2, d("35.50"), Discount::none(), 10),
                quantity: 3,
            },
        ];

        let q = quote(&lines, d("60"), now()).unwrap();

        assert_eq!(q.subtotal, d("306.50"));
        assert_eq!(q.discount_total, d("20"));
        assert_eq!(q.shipping_charge, d("60"));
        assert_eq!(q.total, d("346.50"));
        assert_eq!(q.item_count, 5);

        let line_sum: Decimal = q.lines.iter().map(|l| l.line_total).sum();
        assert_eq!(line_sum, q.subtotal - q.discount_total);
        assert_eq!(q.total, line_sum + q.shipping_charge);
    }

    #[test]
    fn test_quote_insufficient_stock() {
        let lines = vec![QuoteRequestLine {
            product: product(7, d("10"), Discount::none(), 1),
            quantity: 3,
        }];
        assert_eq!(
            quote(&lines, Decimal::ZERO, now()),
            Err(QuoteError::InsufficientStock {
                product_id: ProductId::new(7),
                requested: 3,
                available: 1,
            })
        );
    }

    #[test]
    fn test_quote_rejects_bad_input() {
        assert_eq!(quote(&[], Decimal::ZERO, now()), Err(QuoteError::EmptyCart));

        let zero = vec![QuoteRequestLine {
            product: product(1, d("10"), Discount::none(), 10),
            quantity: 0,
        }];
        assert!(matches!(
            quote(&zero, Decimal::ZERO, now()),
            Err(QuoteError::InvalidQuantity { .. })
        ));

        let dup = vec![
            QuoteRequestLine {
                product: product(1, d("10"), Discount::none(), 10),
                quantity: 1,
            },
            QuoteRequestLine {
                product: product(1, d("10"), Discount::none(), 10),
                quantity: 1,
            },
        ];
        assert_eq!(
            quote(&dup, Decimal::ZERO, now()),
            Err(QuoteError::DuplicateProduct(ProductId::new(1)))
        );

        let mut inactive = product(3, d("10"), Discount::none(), 10);
        inactive.is_active = false;
        assert_eq!(
            quote(
                &[QuoteRequestLine {
                    product: inactive,
                    quantity: 1
                }],
                Decimal::ZERO,
                now()
            ),
            Err(QuoteError::ProductUnavailable(ProductId::new(3)))
        );
    }
}
