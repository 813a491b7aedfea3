//! OpenAPI Specification for the Marquee API
//!
//! Built with utoipa from the route annotations and response types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::account::{CreatedAccount, LoginRequest};
use crate::routes::catalog::TotalPagesResponse;
use crate::routes::claim::ClaimLinkResponse;
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{account, catalog, claim, health};
use crate::services::{ClaimReceipt, LoginOutcome};
use crate::telemetry::metrics;

use marquee_core::{Account, CatalogKind, CatalogRecord, Page};

/// OpenAPI document for the Marquee API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marquee API",
        version = "0.1.0",
        description = "Cached catalog listings and premium claim tokens",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Catalog", description = "Paginated movie and series listings"),
        (name = "Claims", description = "Claim-link issuance and premium redemption"),
        (name = "Accounts", description = "Account creation and lookup"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics"),
    ),
    paths(
        catalog::list_page,
        catalog::total_pages,
        catalog::get_record,
        claim::claim_link,
        claim::claim_premium,
        account::create_account,
        account::login,
        account::get_user,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        Page,
        CatalogRecord,
        CatalogKind,
        TotalPagesResponse,
        ClaimLinkResponse,
        ClaimReceipt,
        LoginRequest,
        LoginOutcome,
        CreatedAccount,
        Account,
        HealthResponse,
        HealthStatus,
        HealthDetails,
        ComponentHealth,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
