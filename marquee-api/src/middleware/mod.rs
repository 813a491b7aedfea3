//! Middleware modules for Marquee API
//!
//! - `rate_limit`: per-IP request flood limiting
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .merge(routes)
//!     // Innermost
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(middleware::from_fn(observability_middleware))
//!     // Outermost
//!     .layer(cors)
//! ```

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, resolve_client_ip, RateLimitState};
