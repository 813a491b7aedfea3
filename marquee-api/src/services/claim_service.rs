//! Claim Service
//!
//! Issues claim links and redeems claim tokens for premium status.
//!
//! Redemption is a strict linear pipeline with no retries:
//! rate-limit check, token verification, account load, cooldown check, then
//! a conditional commit. The cooldown check and the commit act as one
//! compare-and-set on `premium_claimed_at`, so two racing redemptions for
//! the same account can never both succeed.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use marquee_core::{ClaimCommit, Clock, MarqueeError, StorageError, Timestamp};
use marquee_storage::AccountStore;
use serde::{Deserialize, Serialize};

use crate::claim_token::{ClaimTokenIssuer, TokenError};
use crate::error::{ApiError, ApiResult};
use crate::services::rate_limiter::{Admission, RequestRateLimiter};
use crate::telemetry::with_metrics;

// ============================================================================
// ERRORS
// ============================================================================

/// Terminal failure of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("too many claim attempts, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("claim token has expired")]
    TokenExpired,

    #[error("claim token is invalid: {0}")]
    TokenInvalid(String),

    #[error("account {0} not found")]
    AccountNotFound(String),

    #[error("premium already claimed, next claim in {}s", .remaining.num_seconds())]
    CooldownActive { remaining: chrono::Duration },

    #[error("persistent store unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClaimError {
    /// Label used for the redemption outcome metric.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ClaimError::RateLimited { .. } => "rate_limited",
            ClaimError::TokenExpired => "token_expired",
            ClaimError::TokenInvalid(_) => "token_invalid",
            ClaimError::AccountNotFound(_) => "account_not_found",
            ClaimError::CooldownActive { .. } => "cooldown_active",
            ClaimError::PersistenceUnavailable(_) => "persistence_unavailable",
            ClaimError::Internal(_) => "internal",
        }
    }

    fn from_storage(identity: &str, err: MarqueeError) -> Self {
        match err {
            MarqueeError::Storage(StorageError::NotFound { .. }) => {
                ClaimError::AccountNotFound(identity.to_string())
            }
            MarqueeError::Storage(StorageError::LockPoisoned) => {
                ClaimError::Internal(StorageError::LockPoisoned.to_string())
            }
            MarqueeError::Storage(e) => ClaimError::PersistenceUnavailable(e.to_string()),
            other => ClaimError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ClaimError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ClaimError::TokenExpired,
            TokenError::Invalid(reason) => ClaimError::TokenInvalid(reason),
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::RateLimited { retry_after } => {
                ApiError::too_many_requests(Some(retry_after.as_secs().max(1)))
            }
            ClaimError::TokenExpired => ApiError::token_expired(),
            ClaimError::TokenInvalid(reason) => ApiError::invalid_token(reason),
            ClaimError::AccountNotFound(identity) => ApiError::account_not_found(identity),
            ClaimError::CooldownActive { remaining } => {
                ApiError::cooldown_active(remaining.num_seconds())
            }
            ClaimError::PersistenceUnavailable(reason) => ApiError::persistence_unavailable(reason),
            ClaimError::Internal(reason) => ApiError::internal_error(reason),
        }
    }
}

// ============================================================================
// RECEIPT
// ============================================================================

/// Confirmation of a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub identity: String,
    pub is_premium: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub premium_claimed_at: Option<Timestamp>,
    pub message: String,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Claim-link issuance and token redemption.
pub struct ClaimService {
    issuer: ClaimTokenIssuer,
    limiter: Arc<RequestRateLimiter>,
    accounts: Arc<dyn AccountStore>,
    cooldown: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ClaimService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimService")
            .field("issuer", &self.issuer)
            .field("limiter", &self.limiter)
            .field("accounts", &"<AccountStore>")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl ClaimService {
    pub fn new(
        issuer: ClaimTokenIssuer,
        limiter: Arc<RequestRateLimiter>,
        accounts: Arc<dyn AccountStore>,
        cooldown: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer,
            limiter,
            accounts,
            cooldown,
            clock,
        }
    }

    pub fn limiter(&self) -> &Arc<RequestRateLimiter> {
        &self.limiter
    }

    /// Build a redemption link for `identity`. No account lookup happens here.
    pub fn claim_link(&self, identity: &str) -> ApiResult<String> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(ApiError::missing_field("identity"));
        }
        let link = self.issuer.claim_link(identity)?;
        tracing::info!(identity = %identity, "Issued claim link");
        Ok(link)
    }

    /// Redeem `token` on behalf of `requester`.
    pub async fn redeem(&self, requester: IpAddr, token: &str) -> Result<ClaimReceipt, ClaimError> {
        let result = self.run_pipeline(requester, token).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome_label(),
        };
        with_metrics(|m| m.record_claim_redemption(outcome));

        match &result {
            Ok(receipt) => {
                tracing::info!(identity = %receipt.identity, requester = %requester, "Premium claimed")
            }
            Err(e)
                if matches!(
                    e,
                    ClaimError::PersistenceUnavailable(_) | ClaimError::Internal(_)
                ) =>
            {
                tracing::error!(requester = %requester, error = %e, "Claim redemption failed")
            }
            Err(e) => {
                tracing::info!(requester = %requester, outcome, error = %e, "Claim redemption refused")
            }
        }

        result
    }

    async fn run_pipeline(&self, requester: IpAddr, token: &str) -> Result<ClaimReceipt, ClaimError> {
        if let Admission::Denied { retry_after } = self.limiter.admit(requester) {
            return Err(ClaimError::RateLimited { retry_after });
        }

        let claims = self.issuer.verify(token)?;
        let identity = claims.identity;

        let state = self
            .accounts
            .load_account_state(&identity)
            .await
            .map_err(|e| ClaimError::from_storage(&identity, e))?
            .ok_or_else(|| ClaimError::AccountNotFound(identity.clone()))?;

        let now = self.clock.now();
        if let Some(remaining) = state.cooldown_remaining(now, self.cooldown) {
            return Err(ClaimError::CooldownActive { remaining });
        }

        let commit = self
            .accounts
            .commit_account_claim(&identity, now, state.premium_claimed_at)
            .await
            .map_err(|e| ClaimError::from_storage(&identity, e))?;

        match commit {
            ClaimCommit::Committed(updated) => Ok(ClaimReceipt {
                message: format!(
                    "Premium granted for {} hours. Enjoy!",
                    self.cooldown.num_hours()
                ),
                identity: updated.identity,
                is_premium: updated.is_premium,
                premium_claimed_at: updated.premium_claimed_at,
            }),
            // Another redemption committed between our read and our write.
            ClaimCommit::Stale => Err(ClaimError::CooldownActive {
                remaining: self.cooldown,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_token::{ClaimConfig, ClaimSecret};
    use chrono::Duration as ChronoDuration;
    use marquee_test_utils::fixtures::{alice_account, manual_clock};
    use marquee_test_utils::{InMemoryAccountStore, ManualClock};
    use std::net::Ipv4Addr;

    const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

    struct Harness {
        clock: ManualClock,
        accounts: InMemoryAccountStore,
        service: ClaimService,
    }

    async fn harness() -> Harness {
        let clock = manual_clock();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let accounts = InMemoryAccountStore::new();
        accounts
            .create_account(&alice_account())
            .await
            .expect("seed alice");

        let config = ClaimConfig::with_secret(
            ClaimSecret::new("claim-service-test-secret-0123456789".to_string())
                .expect("non-empty"),
        );
        let service = ClaimService::new(
            ClaimTokenIssuer::new(&config, Arc::clone(&shared)),
            Arc::new(RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::clone(&shared))),
            Arc::new(accounts.clone()),
            config.cooldown,
            shared,
        );
        Harness {
            clock,
            accounts,
            service,
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    fn token(h: &Harness, identity: &str) -> String {
        h.service.issuer.issue(identity).expect("token issues")
    }

    #[tokio::test]
    async fn test_first_claim_succeeds() {
        let h = harness().await;
        let receipt = h.service.redeem(ip(1), &token(&h, "alice")).await.unwrap();

        assert_eq!(receipt.identity, "alice");
        assert!(receipt.is_premium);
        assert_eq!(receipt.premium_claimed_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_cooldown_then_success_after_twelve_hours() {
        let h = harness().await;
        h.service.redeem(ip(1), &token(&h, "alice")).await.unwrap();

        h.clock.advance(ChronoDuration::minutes(1));
        let err = h
            .service
            .redeem(ip(2), &token(&h, "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::CooldownActive { .. }));

        h.clock.advance(ChronoDuration::hours(12));
        let receipt = h.service.redeem(ip(3), &token(&h, "alice")).await.unwrap();
        assert_eq!(receipt.premium_claimed_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_rate_limit_applies_even_when_claim_would_succeed() {
        let h = harness().await;
        let bob = marquee_core::Account::new("bob", h.clock.now());
        h.accounts.create_account(&bob).await.unwrap();

        h.service.redeem(ip(1), &token(&h, "alice")).await.unwrap();
        let err = h.service.redeem(ip(1), &token(&h, "bob")).await.unwrap_err();

        assert!(matches!(err, ClaimError::RateLimited { .. }));
        let bob_state = h.accounts.load_account_state("bob").await.unwrap().unwrap();
        assert!(!bob_state.is_premium);
    }

    #[tokio::test]
    async fn test_rate_limited_attempt_is_counted_before_token_check() {
        let h = harness().await;
        let err = h.service.redeem(ip(9), "garbage").await.unwrap_err();
        assert!(matches!(err, ClaimError::TokenInvalid(_)));

        let err = h
            .service
            .redeem(ip(9), &token(&h, "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_expired_token_refused() {
        let h = harness().await;
        let stale = token(&h, "alice");
        h.clock.advance(ChronoDuration::hours(24) + ChronoDuration::seconds(1));

        let err = h.service.redeem(ip(1), &stale).await.unwrap_err();
        assert_eq!(err, ClaimError::TokenExpired);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let h = harness().await;
        let err = h
            .service
            .redeem(ip(1), &token(&h, "ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, ClaimError::AccountNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_store_outage_is_persistence_unavailable() {
        let h = harness().await;
        h.accounts.set_offline(true);
        let err = h
            .service
            .redeem(ip(1), &token(&h, "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::PersistenceUnavailable(_)));
    }

    /// Holds every `load_account_state` caller at a barrier until all of
    /// them have read, so their commits race on the same expected value.
    struct LockstepAccounts {
        inner: InMemoryAccountStore,
        gate: Arc<tokio::sync::Barrier>,
    }

    #[async_trait::async_trait]
    impl AccountStore for LockstepAccounts {
        async fn create_account(
            &self,
            account: &marquee_core::Account,
        ) -> marquee_core::MarqueeResult<()> {
            self.inner.create_account(account).await
        }

        async fn account_by_id(
            &self,
            id: uuid::Uuid,
        ) -> marquee_core::MarqueeResult<Option<marquee_core::Account>> {
            self.inner.account_by_id(id).await
        }

        async fn load_account_state(
            &self,
            identity: &str,
        ) -> marquee_core::MarqueeResult<Option<marquee_core::AccountClaimState>> {
            let state = self.inner.load_account_state(identity).await;
            self.gate.wait().await;
            state
        }

        async fn commit_account_claim(
            &self,
            identity: &str,
            claimed_at: Timestamp,
            expected: Option<Timestamp>,
        ) -> marquee_core::MarqueeResult<ClaimCommit> {
            self.inner
                .commit_account_claim(identity, claimed_at, expected)
                .await
        }

        async fn health_check(&self) -> marquee_core::MarqueeResult<()> {
            self.inner.health_check().await
        }
    }

    #[tokio::test]
    async fn test_racing_commits_grant_once() {
        let h = harness().await;
        let racing = ClaimService::new(
            h.service.issuer.clone(),
            Arc::new(RequestRateLimiter::new(
                TWELVE_HOURS,
                1,
                Arc::new(h.clock.clone()),
            )),
            Arc::new(LockstepAccounts {
                inner: h.accounts.clone(),
                gate: Arc::new(tokio::sync::Barrier::new(2)),
            }),
            h.service.cooldown,
            Arc::new(h.clock.clone()),
        );

        let first_token = token(&h, "alice");
        let second_token = token(&h, "alice");
        let (first, second) = tokio::join!(
            racing.redeem(ip(1), &first_token),
            racing.redeem(ip(2), &second_token),
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let refused: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(
            refused,
            vec![&ClaimError::CooldownActive {
                remaining: h.service.cooldown
            }]
        );

        let state = h.accounts.load_account_state("alice").await.unwrap().unwrap();
        assert!(state.is_premium);
        assert_eq!(state.premium_claimed_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_claim_link_requires_identity() {
        let h = harness().await;
        assert!(h.service.claim_link("  ").is_err());
        let link = h.service.claim_link("alice").unwrap();
        assert!(link.starts_with("/claim-premium?token="));
    }

    #[test]
    fn test_claim_error_status_mapping() {
        use axum::http::StatusCode;

        let cases = [
            (
                ClaimError::RateLimited {
                    retry_after: Duration::from_secs(30),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (ClaimError::TokenExpired, StatusCode::BAD_REQUEST),
            (ClaimError::TokenInvalid("x".into()), StatusCode::BAD_REQUEST),
            (
                ClaimError::CooldownActive {
                    remaining: ChronoDuration::hours(1),
                },
                StatusCode::BAD_REQUEST,
            ),
            (ClaimError::AccountNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ClaimError::PersistenceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ClaimError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}
