//! Router harness shared by the integration tests.
//!
//! Builds the full router over in-memory stores and a manual clock. Proxy
//! headers are trusted so each request can pick its requester address
//! through `X-Forwarded-For`.
#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use marquee_api::{
    ApiConfig, AppState, CacheSettings, ClaimConfig, ClaimSecret, SecureRouterBuilder,
};
use marquee_test_utils::fixtures::{manual_clock, seeded_catalog};
use marquee_test_utils::{InMemoryAccountStore, InMemoryCatalogStore, ManualClock};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-claim-secret-0123456789";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `code` of an error body, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub accounts: InMemoryAccountStore,
    pub catalog: InMemoryCatalogStore,
}

impl TestApp {
    /// Full router with the flood limiter switched off.
    pub fn new() -> Result<Self, String> {
        Self::with_config(ApiConfig {
            rate_limit_enabled: false,
            trust_proxy_headers: true,
            ..ApiConfig::default()
        })
    }

    pub fn with_config(config: ApiConfig) -> Result<Self, String> {
        let clock = Arc::new(manual_clock());
        let accounts = InMemoryAccountStore::new();
        let catalog = seeded_catalog().map_err(|e| e.to_string())?;

        let secret = ClaimSecret::new(TEST_SECRET.to_string()).map_err(|e| e.to_string())?;
        let claim_config = ClaimConfig::with_secret(secret);

        let state = AppState::new(
            Arc::new(accounts.clone()),
            Arc::new(catalog.clone()),
            config,
            &claim_config,
            CacheSettings::default(),
            clock.clone(),
        );

        let router = SecureRouterBuilder::new(state.clone(), &claim_config)
            .map_err(|e| e.to_string())?
            .build()
            .layer(MockConnectInfo(SocketAddr::from((Ipv4Addr::LOCALHOST, 4000))));

        Ok(Self {
            router,
            state,
            clock,
            accounts,
            catalog,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse, String> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&self, uri: &str) -> Result<TestResponse, String> {
        self.get_from(uri, "198.51.100.1").await
    }

    /// GET as if sent by `requester`.
    pub async fn get_from(&self, uri: &str, requester: &str) -> Result<TestResponse, String> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-forwarded-for", requester)
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, json: Option<Value>) -> Result<TestResponse, String> {
        let builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-forwarded-for", "198.51.100.1");
        let request = match json {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .map_err(|e| e.to_string())?;
        self.send(request).await
    }

    pub async fn create_account(&self, pseudo: &str) -> Result<TestResponse, String> {
        self.post(&format!("/create-account?pseudo={}", pseudo), None)
            .await
    }

    /// Fetch a claim link for `identity`. Links are relative, so they can be
    /// requested as-is.
    pub async fn claim_link(&self, identity: &str) -> Result<String, String> {
        let response = self
            .get(&format!("/claim-link?identity={}", identity))
            .await?;
        if response.status != StatusCode::OK {
            return Err(format!("claim-link failed: {:?}", response.body));
        }
        response.body["claimLink"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "claimLink missing".to_string())
    }
}
