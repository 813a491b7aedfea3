//! Shared application state.
//!
//! Every service is constructed once at startup and handed to the router.
//! Handlers extract the piece they need through `FromRef`.

use std::sync::Arc;

use marquee_core::Clock;
use marquee_storage::{AccountStore, CatalogStore};

use crate::claim_token::{ClaimConfig, ClaimTokenIssuer};
use crate::config::{ApiConfig, CacheSettings};
use crate::middleware::RateLimitState;
use crate::routes::health::HealthState;
use crate::services::{AccountService, CatalogService, ClaimService, RequestRateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub claims: Arc<ClaimService>,
    pub accounts: Arc<AccountService>,
    pub health: Arc<HealthState>,
    pub api_config: Arc<ApiConfig>,
    pub rate_limit: RateLimitState,
}

crate::impl_from_ref!(Arc<CatalogService>, catalog);
crate::impl_from_ref!(Arc<ClaimService>, claims);
crate::impl_from_ref!(Arc<AccountService>, accounts);
crate::impl_from_ref!(Arc<HealthState>, health);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(RateLimitState, rate_limit);

impl AppState {
    /// Wire every service over the given stores.
    pub fn new(
        account_store: Arc<dyn AccountStore>,
        catalog_store: Arc<dyn CatalogStore>,
        api_config: ApiConfig,
        claim_config: &ClaimConfig,
        cache_settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = ClaimTokenIssuer::new(claim_config, Arc::clone(&clock));
        let limiter = Arc::new(RequestRateLimiter::new(
            api_config.claim_rate_window,
            api_config.claim_rate_limit,
            Arc::clone(&clock),
        ));

        let claims = ClaimService::new(
            issuer,
            limiter,
            Arc::clone(&account_store),
            claim_config.cooldown,
            Arc::clone(&clock),
        );
        let catalog = CatalogService::new(Arc::clone(&catalog_store), cache_settings, Arc::clone(&clock));
        let accounts = AccountService::new(Arc::clone(&account_store), clock);
        let health = HealthState::new(account_store, catalog_store);

        Self {
            catalog: Arc::new(catalog),
            claims: Arc::new(claims),
            accounts: Arc::new(accounts),
            health: Arc::new(health),
            rate_limit: RateLimitState::new(api_config.clone()),
            api_config: Arc::new(api_config),
        }
    }
}
