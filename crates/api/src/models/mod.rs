//! Domain models for the API.
//!
//! These are validated domain objects, separate from the row types the
//! repositories decode. They serialize directly into response bodies.

pub mod catalog;
pub mod order;
pub mod user;

pub use catalog::{
    Category, CategoryNode, MenuLink, Product, ProductDetail, RatingSummary, Review, Shop,
};
pub use order::{Customer, Order, OrderDetail, OrderWithDetails, Transaction};
pub use user::{CurrentUser, User, UserCredentials};
