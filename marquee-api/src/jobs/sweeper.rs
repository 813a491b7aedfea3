//! Housekeeping Background Task
//!
//! Expired cache pages are already invisible to readers and stale limiter
//! windows are already reset on the next attempt. This task only reclaims
//! the memory they hold, so it never changes what a client observes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

/// Default sweep period.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sweeper background task.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to sweep (default: 60 seconds)
    pub interval: Duration,

    /// Whether to log cycles that reclaimed something (default: true)
    pub log_sweeps: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            log_sweeps: true,
        }
    }
}

impl SweeperConfig {
    /// Create SweeperConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `MARQUEE_SWEEP_INTERVAL_SECS`: Sweep period (default: 60)
    /// - `MARQUEE_SWEEP_LOG`: Whether to log sweeps (default: true)
    pub fn from_env() -> Self {
        let interval = Duration::from_secs(
            std::env::var("MARQUEE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let log_sweeps = std::env::var("MARQUEE_SWEEP_LOG")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            interval,
            log_sweeps,
        }
    }

    /// Short period for local runs.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(10),
            log_sweeps: true,
        }
    }

    /// Longer period, quiet logs.
    pub fn production() -> Self {
        Self {
            interval: Duration::from_secs(300),
            log_sweeps: false,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SweeperMetrics {
    /// Expired cache pages removed since startup
    pub cache_entries_purged: AtomicU64,

    /// Elapsed claim windows dropped
    pub claim_windows_swept: AtomicU64,

    /// Refilled flood-limiter buckets dropped
    pub flood_buckets_swept: AtomicU64,

    /// Completed sweep cycles
    pub sweep_cycles: AtomicU64,

    /// Cycles where the cache could not be swept
    pub sweep_errors: AtomicU64,
}

impl SweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweeperSnapshot {
        SweeperSnapshot {
            cache_entries_purged: self.cache_entries_purged.load(Ordering::Relaxed),
            claim_windows_swept: self.claim_windows_swept.load(Ordering::Relaxed),
            flood_buckets_swept: self.flood_buckets_swept.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweeper metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperSnapshot {
    pub cache_entries_purged: u64,
    pub claim_windows_swept: u64,
    pub flood_buckets_swept: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep until `shutdown_rx` flips to `true`, then return the metrics.
pub async fn sweeper_task(
    state: AppState,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweeperMetrics> {
    let metrics = Arc::new(SweeperMetrics::new());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Sweeper task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Sweeper task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&state, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cache_entries_purged = snapshot.cache_entries_purged,
        claim_windows_swept = snapshot.claim_windows_swept,
        flood_buckets_swept = snapshot.flood_buckets_swept,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Sweeper task completed"
    );

    metrics
}

/// Perform one sweep cycle.
pub fn sweep_once(state: &AppState, config: &SweeperConfig, metrics: &SweeperMetrics) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    let purged = match state.catalog.purge_expired() {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(error = %e, "Failed to purge expired cache pages");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            0
        }
    };
    let windows = state.claims.limiter().sweep();
    let buckets = state.rate_limit.sweep();

    metrics
        .cache_entries_purged
        .fetch_add(purged as u64, Ordering::Relaxed);
    metrics
        .claim_windows_swept
        .fetch_add(windows as u64, Ordering::Relaxed);
    metrics
        .flood_buckets_swept
        .fetch_add(buckets as u64, Ordering::Relaxed);

    if purged + windows + buckets > 0 && config.log_sweeps {
        tracing::info!(
            cache_entries = purged,
            claim_windows = windows,
            flood_buckets = buckets,
            "Sweep cycle reclaimed state"
        );
    } else {
        tracing::trace!("Sweep cycle completed with nothing to reclaim");
    }
}

// ============================================================================
// TESTS
// ============================================================================
