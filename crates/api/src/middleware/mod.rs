//! HTTP middleware stack for the API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, transaction per route)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//! 5. Rate limiting on `/api/auth` (governor)
//!
//! Authentication is done per handler through the extractors in [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{OptionalAuth, RequireAdmin, RequireAuth};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
