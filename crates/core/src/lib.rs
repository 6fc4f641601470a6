//! Bazaar Core - shared domain types.
//!
//! Used by every Bazaar component:
//! - `api` - JSON API server (catalog, checkout, orders, accounts)
//! - `cli` - migrations, admin bootstrap, catalog seeding
//!
//! # Architecture
//!
//! The core crate holds types and pure functions only: no database access and
//! no HTTP clients. Pricing and order-number rules live here so they can be
//! tested without infrastructure.
//!
//! # Modules
//!
//! - [`types`] - ids, email, SKU, pricing, statuses, order numbers and tokens

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
