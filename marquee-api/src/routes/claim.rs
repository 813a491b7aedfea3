//! Claim REST API Routes
//!
//! `/claim-link` hands out a signed redemption link for an identity.
//! `/claim-premium` redeems it, throttled per requester address.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::resolve_client_ip;
use crate::services::ClaimService;
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct ClaimLinkQuery {
    /// Pseudo the link is issued for
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ClaimLinkResponse {
    pub claim_link: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct RedeemQuery {
    /// Claim token taken from the link
    pub token: Option<String>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /claim-link - Issue a claim link
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/claim-link",
    tag = "Claims",
    params(ClaimLinkQuery),
    responses(
        (status = 200, description = "Claim link issued", body = ClaimLinkResponse),
        (status = 400, description = "Missing identity", body = ApiError),
    ),
))]
pub async fn claim_link(
    State(claims): State<Arc<ClaimService>>,
    query: Result<Query<ClaimLinkQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let identity = query
        .identity
        .ok_or_else(|| ApiError::missing_field("identity"))?;

    let claim_link = claims.claim_link(&identity)?;
    Ok(Json(ClaimLinkResponse { claim_link }))
}

/// GET /claim-premium - Redeem a claim token
///
/// A missing token or an unreadable query string still goes through the
/// pipeline, so it consumes the requester's window and then fails token
/// verification.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/claim-premium",
    tag = "Claims",
    params(RedeemQuery),
    responses(
        (status = 200, description = "Premium granted", body = crate::services::ClaimReceipt),
        (status = 400, description = "Invalid or expired token, or cooldown active", body = ApiError),
        (status = 404, description = "Unknown identity", body = ApiError),
        (status = 429, description = "Requester already attempted within the window", body = ApiError),
        (status = 503, description = "Account store unavailable", body = ApiError),
    ),
))]
pub async fn claim_premium(
    State(claims): State<Arc<ClaimService>>,
    State(config): State<Arc<ApiConfig>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<RedeemQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let requester = resolve_client_ip(&headers, peer, config.trust_proxy_headers);
    let token = match query {
        Ok(Query(query)) => query.token.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(
                requester = %requester,
                error = %rejection.body_text(),
                "Unreadable claim query"
            );
            String::new()
        }
    };

    let receipt = claims.redeem(requester, &token).await?;
    Ok(Json(receipt))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/claim-link", get(claim_link))
        .route("/claim-premium", get(claim_premium))
}
