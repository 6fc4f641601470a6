//! Core types for Bazaar.
//!
//! Type-safe wrappers and pure business rules for the storefront domain.

pub mod email;
pub mod id;
pub mod order_number;
pub mod pricing;
pub mod sku;
pub mod status;
pub mod token;

pub use email::{Email, EmailError};
pub use id::*;
pub use order_number::{OrderNumber, OrderNumberError};
pub use pricing::{
    Discount, DiscountError, DiscountType, PriceBreakdown, ProductSnapshot, Quote, QuoteError,
    QuoteLine, QuoteRequestLine, quote, unit_price,
};
pub use sku::{Sku, SkuError};
pub use status::*;
pub use token::{GuestToken, PlainToken, TokenError, hash_token_secret};
