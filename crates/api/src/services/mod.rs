//! Business logic services for the API.
//!
//! # Services
//!
//! - `auth` - registration, login, bearer token issue and resolution
//! - `catalog` - slugs and the category tree
//! - `checkout` - quoting and placing orders
//! - `courier` - Steadfast courier API client
//! - `orders` - tracking, status changes, payments and courier booking
//! - `users` - account administration and corporate approval
//!
//! Services borrow the pool from `AppState` and are built per request.

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod courier;
pub mod orders;
pub mod users;
