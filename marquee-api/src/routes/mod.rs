//! REST API Routes Module
//!
//! Includes:
//! - Catalog listings, page totals and single-record reads
//! - Claim-link issuance and premium redemption
//! - Account creation, login and lookup
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document
//! - CORS support for browser-based clients

pub mod account;
pub mod catalog;
pub mod claim;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::claim_token::ClaimConfig;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use account::create_router as account_router;
pub use catalog::create_router as catalog_router;
pub use claim::create_router as claim_router;
pub use health::create_router as health_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

/// Check if running in a production environment.
pub(crate) fn is_production_environment() -> bool {
    std::env::var("MARQUEE_ENVIRONMENT")
        .map(|e| matches!(e.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

/// Validate API configuration for production use.
fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if config.cors_origins.is_empty() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set MARQUEE_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production - this is not recommended.\n\
             Set MARQUEE_RATE_LIMIT_ENABLED=true to enable rate limiting."
        );
    }
    if config.trust_proxy_headers {
        tracing::info!("Trusting X-Forwarded-For / X-Real-IP for client addresses");
    }
    Ok(())
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builder for the API router with flood limiting, observability and CORS.
///
/// Every route, health and metrics included, sits behind the flood limiter.
pub struct SecureRouterBuilder {
    state: AppState,
    metrics_enabled: bool,
}

impl SecureRouterBuilder {
    /// Create a new SecureRouterBuilder.
    ///
    /// Validates the claim secret and, in production, the CORS and throttling
    /// settings. Misconfiguration fails here rather than at first request.
    pub fn new(state: AppState, claim_config: &ClaimConfig) -> ApiResult<Self> {
        claim_config.validate_for_production()?;
        if is_production_environment() {
            validate_api_config_for_production(&state.api_config)?;
        }

        Ok(Self {
            state,
            metrics_enabled: true,
        })
    }

    /// Mount or hide `/metrics`.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS (outermost) - handles preflight requests
    /// 2. Observability - tracing and metrics
    /// 3. Flood limiting (innermost)
    pub fn build(self) -> Router {
        let mut router = Router::new()
            .nest("/catalog", catalog::create_router())
            .merge(claim::create_router())
            .merge(account::create_router())
            .nest("/health", health::create_router());

        if self.metrics_enabled {
            router = router.route("/metrics", get(metrics_handler));
        }

        #[cfg(feature = "openapi")]
        {
            router = router.route("/openapi.json", get(openapi_json));
        }

        let cors = build_cors_layer(&self.state.api_config);

        router
            .layer(from_fn_with_state(
                self.state.rate_limit.clone(),
                rate_limit_middleware,
            ))
            .layer(from_fn(observability_middleware))
            .layer(cors)
            .with_state(self.state)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// Otherwise only the configured origins are allowed, including
/// `*.domain` wildcard entries.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let allowed = config.clone();
        let origins = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| allowed.is_origin_allowed(o))
                .unwrap_or(false)
        });

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the complete API router.
///
/// - Catalog routes at /catalog/*
/// - Claim routes at /claim-link and /claim-premium
/// - Account routes at /create-account, /login and /user/{id}
/// - Health checks at /health/*
/// - Metrics at /metrics
/// - OpenAPI spec at /openapi.json (feature `openapi`)
pub fn create_api_router(state: AppState, claim_config: &ClaimConfig) -> ApiResult<Router> {
    Ok(SecureRouterBuilder::new(state, claim_config)?.build())
}
