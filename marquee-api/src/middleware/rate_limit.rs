//! Request flood limiting.
//!
//! A coarse per-IP token bucket in front of every route. It is separate from
//! the claim limiter in `services::rate_limiter`, which enforces the fixed
//! redemption window on `/claim-premium` only.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Type alias for the rate limiter we use.
type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    /// Per-IP limiters
    limiters: Arc<DashMap<IpAddr, Arc<DirectRateLimiter>>>,
}

impl RateLimitState {
    /// Create new rate limit state from API configuration.
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectRateLimiter> {
        let limiter = self.limiters.entry(ip).or_insert_with(|| {
            let quota = Quota::per_minute(
                NonZeroU32::new(self.config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
            )
            .allow_burst(NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN));

            Arc::new(RateLimiter::direct(quota))
        });

        Arc::clone(&limiter)
    }

    /// Number of client IPs with a live bucket.
    pub fn tracked_clients(&self) -> usize {
        self.limiters.len()
    }

    /// Forget every bucket that is back to full capacity.
    pub fn sweep(&self) -> usize {
        let before = self.limiters.len();
        let burst = NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN);
        self.limiters
            .retain(|_, limiter| limiter.check_n(burst).map_or(true, |r| r.is_err()));
        before.saturating_sub(self.limiters.len())
    }
}

/// Client address for throttling decisions.
///
/// Proxy headers (`X-Forwarded-For`, then `X-Real-IP`) are only honored when
/// `trust_proxy_headers` is set; otherwise any client could pick its own key.
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        // X-Forwarded-For can contain multiple IPs, take the first one
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
        {
            return ip;
        }

        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
        {
            return ip;
        }
    }

    peer.ip()
}

/// Rate limiting middleware.
///
/// When rate limited, returns 429 Too Many Requests with Retry-After header.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit_enabled {
        return next.run(request).await;
    }

    let ip = resolve_client_ip(request.headers(), addr, state.config.trust_proxy_headers);
    let limiter = state.limiter_for(ip);

    match limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            if let Ok(value) = HeaderValue::from_str(&state.config.rate_limit_per_minute.to_string())
            {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-ratelimit-limit"), value);
            }
            response
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);

            tracing::warn!(client_ip = %ip, retry_after, "Request flood limit hit");
            ApiError::too_many_requests(Some(retry_after)).into_response()
        }
    }
}
