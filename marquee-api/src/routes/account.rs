//! Account REST API Routes
//!
//! Account creation, login-by-id and lookup.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::AccountService;
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct CreateAccountQuery {
    /// Desired pseudo, at least 3 characters
    pub pseudo: Option<String>,
}

/// Body of `POST /login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    pub id: Option<String>,
}

/// Public view of a freshly created account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    pub id: Uuid,
    pub pseudo: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: marquee_core::Timestamp,
    pub is_premium: bool,
}

impl From<marquee_core::Account> for CreatedAccount {
    fn from(account: marquee_core::Account) -> Self {
        Self {
            id: account.id,
            pseudo: account.pseudo,
            created_at: account.created_at,
            is_premium: account.is_premium,
        }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /create-account - Create an account
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/create-account",
    tag = "Accounts",
    params(CreateAccountQuery),
    responses(
        (status = 201, description = "Account created", body = CreatedAccount),
        (status = 400, description = "Missing or short pseudo", body = ApiError),
        (status = 409, description = "Pseudo already taken", body = ApiError),
    ),
))]
pub async fn create_account(
    State(accounts): State<Arc<AccountService>>,
    query: Result<Query<CreateAccountQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let pseudo = query.pseudo.ok_or_else(|| ApiError::missing_field("pseudo"))?;

    let account = accounts.create(&pseudo).await?;
    Ok((StatusCode::CREATED, Json(CreatedAccount::from(account))))
}

/// POST /login - Check that an account id exists
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/login",
    tag = "Accounts",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login outcome", body = crate::services::LoginOutcome),
        (status = 400, description = "Missing id", body = ApiError),
    ),
))]
pub async fn login(
    State(accounts): State<Arc<AccountService>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let outcome = accounts.login(body.id.as_deref()).await?;
    Ok(Json(outcome))
}

/// GET /user/{id} - Full account
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/user/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account found", body = marquee_core::Account),
        (status = 400, description = "Malformed id", body = ApiError),
        (status = 404, description = "No such account", body = ApiError),
    ),
))]
pub async fn get_user(
    State(accounts): State<Arc<AccountService>>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::invalid_format("id", "UUID"))?;

    let account = accounts.get(id).await?;
    Ok(Json(account))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/create-account", post(create_account))
        .route("/login", post(login))
        .route("/user/:id", get(get_user))
}
