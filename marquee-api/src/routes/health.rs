//! Health Check Endpoints
//!
//! Kubernetes-compatible probes:
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Round-trip to both stores

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use marquee_core::MarqueeResult;
use marquee_storage::{AccountStore, CatalogStore};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub accounts: ComponentHealth,
    pub catalog: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_probe(probe: Result<u64, String>) -> Self {
        match probe {
            Ok(latency) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(latency),
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e),
            },
        }
    }
}

/// Both healthy → healthy, both down → unhealthy, anything else → degraded.
pub fn overall_status(components: &[&ComponentHealth]) -> HealthStatus {
    let healthy = components
        .iter()
        .filter(|c| c.status == HealthStatus::Healthy)
        .count();
    if healthy == components.len() {
        HealthStatus::Healthy
    } else if healthy == 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// ============================================================================
// STATE
// ============================================================================

pub struct HealthState {
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn CatalogStore>,
    start_time: Instant,
}

impl HealthState {
    pub fn new(accounts: Arc<dyn AccountStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            accounts,
            catalog,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
))]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (store connectivity)
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Service is not ready", body = HealthResponse),
    ),
))]
pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let (accounts, catalog) = tokio::join!(
        probe("Account store", state.accounts.health_check()),
        probe("Catalog store", state.catalog.health_check()),
    );
    let accounts = ComponentHealth::from_probe(accounts);
    let catalog = ComponentHealth::from_probe(catalog);

    let status = overall_status(&[&accounts, &catalog]);
    if status != HealthStatus::Healthy {
        tracing::warn!(
            accounts = ?accounts.status,
            catalog = ?catalog.status,
            "Readiness check failed"
        );
    }

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            accounts,
            catalog,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

async fn probe(
    component: &str,
    check: impl std::future::Future<Output = MarqueeResult<()>>,
) -> Result<u64, String> {
    let start = Instant::now();
    match check.await {
        Ok(()) => Ok(start.elapsed().as_millis() as u64),
        Err(e) => Err(format!("{} check failed: {}", component, e)),
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_storage::{InMemoryAccountStore, InMemoryCatalogStore};

    fn component(status: HealthStatus) -> ComponentHealth {
        ComponentHealth {
            status,
            latency_ms: None,
            error: None,
        }
    }

    #[test]
    fn test_health_response_serialization() -> Result<(), serde_json::Error> {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("All systems operational".to_string()),
            details: None,
        };

        let json = serde_json::to_string(&response)?;
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(!json.contains("details"));
        Ok(())
    }

    #[test]
    fn test_overall_status() {
        let up = component(HealthStatus::Healthy);
        let down = component(HealthStatus::Unhealthy);

        assert_eq!(overall_status(&[&up, &up]), HealthStatus::Healthy);
        assert_eq!(overall_status(&[&up, &down]), HealthStatus::Degraded);
        assert_eq!(overall_status(&[&down, &down]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_readiness_reports_offline_store() -> Result<(), String> {
        let accounts = Arc::new(InMemoryAccountStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        catalog.set_offline(true);
        let state = Arc::new(HealthState::new(accounts, catalog));

        let response = readiness(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["details"]["accounts"]["status"], "healthy");
        assert_eq!(json["details"]["catalog"]["status"], "unhealthy");
        Ok(())
    }

    #[test]
    fn test_component_health_with_error() -> Result<(), serde_json::Error> {
        let component = ComponentHealth::from_probe(Err("Connection refused".to_string()));

        let json = serde_json::to_string(&component)?;
        assert!(json.contains("\"status\":\"unhealthy\""));
        assert!(json.contains("Connection refused"));
        Ok(())
    }
}
