//! Service Layer
//!
//! Business logic behind the HTTP handlers. Handlers stay thin: they parse
//! the request, call one service method and serialize the result.

mod account_service;
mod catalog_service;
mod claim_service;
pub mod rate_limiter;

pub use account_service::*;
pub use catalog_service::*;
pub use claim_service::*;
pub use rate_limiter::{Admission, RateLimitWindow, RequestRateLimiter};
