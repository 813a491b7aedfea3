//! Marquee API - HTTP layer for cached catalog listings and premium claims
//!
//! Catalog pages are served through a per-kind expiring cache in front of
//! the catalog store. Premium status is granted by redeeming a signed claim
//! token, gated by a per-account cooldown and a per-requester fixed window.

mod macros;

pub mod claim_token;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use claim_token::{ClaimConfig, ClaimSecret, ClaimTokenClaims, ClaimTokenIssuer, TokenError};
pub use config::{ApiConfig, CacheSettings, StorageBackend};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{sweeper_task, SweeperConfig};
pub use middleware::RateLimitState;
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::{create_api_router, SecureRouterBuilder};
pub use services::{
    AccountService, CatalogService, ClaimError, ClaimReceipt, ClaimService, RequestRateLimiter,
};
pub use state::AppState;
