//! Error Types for Marquee API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON `{code, message, details?}` with the
//! status code carried by their [`ErrorCode`].

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use marquee_core::{MarqueeError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field value is out of valid range
    InvalidRange,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Claim Errors (400)
    // ========================================================================
    /// Claim token signature or structure is invalid
    InvalidToken,

    /// Claim token is past its expiry
    TokenExpired,

    /// The account claimed premium too recently
    CooldownActive,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested account does not exist
    AccountNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    // ========================================================================
    // Throttling (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Persistent store exhausted or unreachable
    PersistenceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::CooldownActive => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound | ErrorCode::AccountNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::PersistenceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",

            ErrorCode::InvalidToken => "Claim token is invalid",
            ErrorCode::TokenExpired => "Claim token has expired",
            ErrorCode::CooldownActive => "Premium can only be claimed once every 12 hours",

            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::AccountNotFound => "Account not found",

            ErrorCode::EntityAlreadyExists => "Entity already exists",

            ErrorCode::TooManyRequests => "Rate limit exceeded",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::PersistenceUnavailable => "Persistent store unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,

    /// Seconds the client should wait before retrying; sent as `Retry-After`.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Create a CooldownActive error reporting how long is left.
    pub fn cooldown_active(remaining_secs: i64) -> Self {
        Self::from_code(ErrorCode::CooldownActive)
            .with_details(serde_json::json!({ "remainingSecs": remaining_secs.max(0) }))
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn account_not_found(identity: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AccountNotFound,
            format!("Account {} not found", identity),
        )
    }

    pub fn entity_already_exists(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityAlreadyExists,
            format!("{} {} already exists", entity_type, id),
        )
    }

    /// Create a TooManyRequests error that carries a `Retry-After` hint.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        let mut err = Self::new(ErrorCode::TooManyRequests, message);
        err.retry_after_secs = retry_after_secs;
        err
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn persistence_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<MarqueeError> for ApiError {
    fn from(err: MarqueeError) -> Self {
        match err {
            MarqueeError::Storage(e) => e.into(),
            MarqueeError::Validation(e) => e.into(),
            MarqueeError::Config(e) => {
                tracing::error!(error = %e, "Configuration error reached a request");
                ApiError::internal_error(e.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => ApiError::entity_not_found(&entity, id),
            StorageError::AlreadyExists { entity, id } => {
                ApiError::entity_already_exists(&entity, id)
            }
            StorageError::Unavailable { reason } => {
                tracing::warn!(reason = %reason, "Persistent store unavailable");
                ApiError::persistence_unavailable(reason)
            }
            StorageError::QueryFailed { .. } | StorageError::MalformedRow { .. } => {
                tracing::error!(error = %err, "Storage operation failed");
                ApiError::database_error("Database operation failed")
            }
            StorageError::LockPoisoned => ApiError::internal_error("In-memory state lock poisoned"),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match &err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::MissingField,
            ValidationError::InvalidValue { .. } => ErrorCode::ValidationFailed,
            ValidationError::OutOfRange { .. } => ErrorCode::InvalidRange,
        };
        ApiError::new(code, err.to_string())
    }
}

/// Malformed query strings (`?page=abc`).
impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::invalid_input(err.body_text())
    }
}

/// Path segments that fail to parse (`/catalog/movies/abc`).
impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::invalid_input(err.body_text())
    }
}

/// Missing or undecodable JSON bodies.
impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::invalid_input(err.body_text())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::CooldownActive.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::AccountNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::TooManyRequests.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::PersistenceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: ApiError = StorageError::Unavailable {
            reason: "pool timeout".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::PersistenceUnavailable);

        let err: ApiError = StorageError::not_found("Movie", 42).into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert!(err.message.contains("42"));

        let err: ApiError = MarqueeError::from(StorageError::AlreadyExists {
            entity: "Account".to_string(),
            id: "alice".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_validation_error_conversion() {
        let err: ApiError = ValidationError::OutOfRange {
            field: "perPage".to_string(),
            min: 1,
            max: 50,
            got: 80,
        }
        .into();
        assert_eq!(err.code, ErrorCode::InvalidRange);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_too_many_requests_sets_retry_after_header() {
        let response = ApiError::too_many_requests(Some(120)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("120"))
        );
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::cooldown_active(3600);
        let json = serde_json::to_value(&err)?;

        assert_eq!(json["code"], "COOLDOWN_ACTIVE");
        assert_eq!(json["details"]["remainingSecs"], 3600);
        assert!(json.get("retry_after_secs").is_none());
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::database_error("Connection failed");
        let display = format!("{}", err);

        assert!(display.contains("DatabaseError"));
        assert!(display.contains("Connection failed"));
    }
}
