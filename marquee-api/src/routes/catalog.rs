//! Catalog REST API Routes
//!
//! Paginated listings served through the page cache, row-count based page
//! totals, and uncached single-record reads.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use marquee_core::{CatalogKind, Page, DEFAULT_PAGE, DEFAULT_PER_PAGE};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::services::CatalogService;
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    /// 1-based page number (default 1)
    pub page: Option<i64>,
    /// Records per page, 1 to 50 (default 15)
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[serde(rename_all = "camelCase")]
pub struct TotalPagesQuery {
    /// Records per page, 1 to 50 (default 15)
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TotalPagesResponse {
    pub total_pages: u64,
}

fn parse_kind(raw: &str) -> ApiResult<CatalogKind> {
    Ok(raw.parse::<CatalogKind>()?)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /catalog/{kind} - One page of a catalog
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/catalog/{kind}",
    tag = "Catalog",
    params(
        ("kind" = CatalogKind, Path, description = "movies or series"),
        PageQuery,
    ),
    responses(
        (status = 200, description = "Page of records", body = Page),
        (status = 400, description = "Invalid pagination or kind", body = crate::error::ApiError),
        (status = 503, description = "Catalog store unavailable", body = crate::error::ApiError),
    ),
))]
pub async fn list_page(
    State(catalog): State<Arc<CatalogService>>,
    kind: Result<Path<String>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(kind) = kind?;
    let Query(query) = query?;
    let kind = parse_kind(&kind)?;

    let page = catalog
        .fetch(
            kind,
            query.page.unwrap_or(i64::from(DEFAULT_PAGE)),
            query.per_page.unwrap_or(i64::from(DEFAULT_PER_PAGE)),
        )
        .await?;

    Ok(Json(Page::clone(&page)))
}

/// GET /catalog/{kind}/total_pages - Number of pages at a given page size
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/catalog/{kind}/total_pages",
    tag = "Catalog",
    params(
        ("kind" = CatalogKind, Path, description = "movies or series"),
        TotalPagesQuery,
    ),
    responses(
        (status = 200, description = "Page count", body = TotalPagesResponse),
        (status = 400, description = "Invalid page size or kind", body = crate::error::ApiError),
    ),
))]
pub async fn total_pages(
    State(catalog): State<Arc<CatalogService>>,
    kind: Result<Path<String>, PathRejection>,
    query: Result<Query<TotalPagesQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(kind) = kind?;
    let Query(query) = query?;
    let kind = parse_kind(&kind)?;

    let total_pages = catalog
        .total_pages(kind, query.per_page.unwrap_or(i64::from(DEFAULT_PER_PAGE)))
        .await?;

    Ok(Json(TotalPagesResponse { total_pages }))
}

/// GET /catalog/{kind}/{id} - Single record
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/catalog/{kind}/{id}",
    tag = "Catalog",
    params(
        ("kind" = CatalogKind, Path, description = "movies or series"),
        ("id" = i64, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "Record found", body = marquee_core::CatalogRecord),
        (status = 404, description = "No such record", body = crate::error::ApiError),
    ),
))]
pub async fn get_record(
    State(catalog): State<Arc<CatalogService>>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path((kind, id)) = path?;
    let kind = parse_kind(&kind)?;

    let record = catalog.record(kind, id).await?;
    Ok(Json(record))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/:kind", get(list_page))
        .route("/:kind/total_pages", get(total_pages))
        .route("/:kind/:id", get(get_record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_uses_camel_case() -> Result<(), serde_json::Error> {
        let query: PageQuery = serde_json::from_str(r#"{"page": 2, "perPage": 30}"#)?;
        assert_eq!(query.page, Some(2));
        assert_eq!(query.per_page, Some(30));
        Ok(())
    }

    #[test]
    fn test_total_pages_response_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&TotalPagesResponse { total_pages: 4 })?;
        assert_eq!(json, r#"{"totalPages":4}"#);
        Ok(())
    }

    #[test]
    fn test_unknown_kind_is_validation_error() {
        let err = parse_kind("podcasts").err();
        assert_eq!(
            err.map(|e| e.code),
            Some(crate::error::ErrorCode::ValidationFailed)
        );
    }
}
