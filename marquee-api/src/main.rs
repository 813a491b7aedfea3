//! Marquee API Server Entry Point
//!
//! Bootstraps configuration, selects the storage backend, spawns the
//! sweeper and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use marquee_api::jobs::{sweeper_task, SweeperConfig};
use marquee_api::telemetry::{init_tracing, TelemetryConfig};
use marquee_api::{
    ApiConfig, ApiError, ApiResult, AppState, CacheSettings, ClaimConfig, DbClient, DbConfig,
    SecureRouterBuilder, StorageBackend,
};
use marquee_core::SystemClock;
use marquee_storage::{AccountStore, CatalogStore, InMemoryAccountStore, InMemoryCatalogStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config =
        ApiConfig::from_env().map_err(|e| ApiError::invalid_input(e.to_string()))?;
    let claim_config = ClaimConfig::from_env()?;
    let cache_settings = CacheSettings::from_env();

    let (accounts, catalog) = open_stores(&api_config.storage_backend).await?;

    let state = AppState::new(
        accounts,
        catalog,
        api_config,
        &claim_config,
        cache_settings,
        Arc::new(SystemClock),
    );

    let app = SecureRouterBuilder::new(state.clone(), &claim_config)?
        .metrics(telemetry_config.metrics_enabled)
        .build();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeper_task(
        state,
        SweeperConfig::from_env(),
        shutdown_rx,
    ));

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Marquee API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweeper task did not shut down cleanly");
    }

    Ok(())
}

async fn open_stores(
    backend: &StorageBackend,
) -> ApiResult<(Arc<dyn AccountStore>, Arc<dyn CatalogStore>)> {
    match backend {
        StorageBackend::Postgres => {
            let db = Arc::new(DbClient::from_config(&DbConfig::from_env())?);
            db.migrate().await?;
            tracing::info!(pool_size = db.pool_size(), "Using Postgres storage");
            let accounts: Arc<dyn AccountStore> = db.clone();
            let catalog: Arc<dyn CatalogStore> = db;
            Ok((accounts, catalog))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::new());
            let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
            Ok((accounts, catalog))
        }
    }
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("MARQUEE_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("MARQUEE_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
