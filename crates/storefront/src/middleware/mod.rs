//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. CORS (storefront origin only)
//! 4. Request ID (add unique ID to each request)
//! 5. Session layer (tower-sessions with `PostgreSQL` store)
//! 6. Rate limiting (governor), per route group

pub mod admin;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use admin::RequireAdmin;
pub use rate_limit::{api_rate_limiter, client_ip, payment_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use session::create_session_layer;
