//! Request-Rate Limiter
//!
//! Fixed-window admission control keyed by requester address. Every attempt
//! counts against the window, whether or not it is admitted and whatever
//! happens to the request afterwards.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use marquee_core::{Clock, Timestamp};

/// Per-requester window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: Timestamp,
    pub count: u32,
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted; `remaining` further attempts fit in this window.
    Allowed { remaining: u32 },
    /// Refused until the window resets.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Fixed-window limiter: at most `limit` attempts per key per `window`.
#[derive(Debug)]
pub struct RequestRateLimiter {
    windows: DashMap<IpAddr, RateLimitWindow>,
    window: chrono::Duration,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl RequestRateLimiter {
    /// Create a limiter. `limit` is clamped to at least 1.
    pub fn new(window: Duration, limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            limit: limit.max(1),
            clock,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record an attempt from `key` and decide whether to admit it.
    ///
    /// The read-modify-write happens under the map's per-shard lock, so two
    /// racing attempts from one key can never both take the last slot.
    pub fn admit(&self, key: IpAddr) -> Admission {
        let now = self.clock.now();
        let mut entry = self.windows.entry(key).or_insert(RateLimitWindow {
            window_start: now,
            count: 0,
        });

        if now - entry.window_start >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count = entry.count.saturating_add(1);

        if entry.count <= self.limit {
            Admission::Allowed {
                remaining: self.limit - entry.count,
            }
        } else {
            let elapsed = now - entry.window_start;
            let retry_after = self
                .window
                .checked_sub(&elapsed)
                .and_then(|left| left.to_std().ok())
                .unwrap_or(Duration::ZERO);
            Admission::Denied { retry_after }
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now - window.window_start < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Requester windows currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use marquee_core::ManualClock;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_second_attempt_in_window_denied() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::new(clock.clone()));

        assert_eq!(limiter.admit(ip(1)), Admission::Allowed { remaining: 0 });

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(
            limiter.admit(ip(1)),
            Admission::Denied {
                retry_after: Duration::from_secs(11 * 60 * 60)
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::new(clock));

        assert!(limiter.admit(ip(1)).is_allowed());
        assert!(limiter.admit(ip(2)).is_allowed());
        assert!(!limiter.admit(ip(1)).is_allowed());
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_window_resets_at_boundary() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::new(clock.clone()));
        assert!(limiter.admit(ip(1)).is_allowed());

        clock.advance(chrono::Duration::hours(12) - chrono::Duration::seconds(1));
        assert!(!limiter.admit(ip(1)).is_allowed());

        clock.advance(chrono::Duration::seconds(1));
        assert!(limiter.admit(ip(1)).is_allowed());
    }

    #[test]
    fn test_denied_attempts_do_not_extend_window() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::new(clock.clone()));
        assert!(limiter.admit(ip(1)).is_allowed());

        for _ in 0..5 {
            clock.advance(chrono::Duration::hours(2));
            assert!(!limiter.admit(ip(1)).is_allowed());
        }

        clock.advance(chrono::Duration::hours(2));
        assert!(limiter.admit(ip(1)).is_allowed());
    }

    #[test]
    fn test_sweep_drops_elapsed_windows() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(TWELVE_HOURS, 1, Arc::new(clock.clone()));
        limiter.admit(ip(1));
        clock.advance(chrono::Duration::hours(6));
        limiter.admit(ip(2));

        clock.advance(chrono::Duration::hours(7));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_unbounded_window_survives_clock_step_back() {
        let clock = clock();
        let limiter = RequestRateLimiter::new(Duration::MAX, 1, Arc::new(clock.clone()));
        assert!(limiter.admit(ip(1)).is_allowed());

        clock.advance(chrono::Duration::hours(-1));
        assert_eq!(
            limiter.admit(ip(1)),
            Admission::Denied {
                retry_after: Duration::ZERO
            }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Within one window, exactly `limit` attempts are admitted no
        /// matter how many are made.
        #[test]
        fn prop_admits_exactly_limit_per_window(limit in 1u32..10, attempts in 1u32..40) {
            let clock = clock();
            let limiter = RequestRateLimiter::new(TWELVE_HOURS, limit, Arc::new(clock.clone()));
            let mut admitted = 0;
            for _ in 0..attempts {
                if limiter.admit(ip(7)).is_allowed() {
                    admitted += 1;
                }
                clock.advance(chrono::Duration::seconds(1));
            }
            prop_assert_eq!(admitted, attempts.min(limit));
        }
    }
}
