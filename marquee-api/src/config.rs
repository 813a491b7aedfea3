//! API Configuration Module
//!
//! Configuration for CORS, request throttling, the claim rate limiter, the
//! catalog cache and the storage backend. Everything is loaded from
//! `MARQUEE_*` environment variables with development-friendly defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use marquee_core::{
    ConfigError, CATALOG_CACHE_CAPACITY, CATALOG_PAGE_TTL_SECS, CLAIM_RATE_WINDOW_SECS,
};

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// STORAGE BACKEND
// ============================================================================

/// Which collaborator backs accounts and catalogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// PostgreSQL through a deadpool connection pool.
    #[default]
    Postgres,
    /// Process-local maps; state is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "MARQUEE_STORAGE".to_string(),
                value: other.to_string(),
                reason: "expected 'postgres' or 'memory'".to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Postgres => f.write_str("postgres"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, throttling and production hardening.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Request Flood Limiting
    // ========================================================================
    /// Whether the per-IP flood limiter wraps every route.
    pub rate_limit_enabled: bool,

    /// Requests per minute per client IP.
    pub rate_limit_per_minute: u32,

    /// Burst capacity above the steady rate.
    pub rate_limit_burst: u32,

    /// Use `X-Forwarded-For` / `X-Real-IP` as the client address.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_proxy_headers: bool,

    // ========================================================================
    // Claim Rate Limiting
    // ========================================================================
    /// Fixed window for claim redemptions per requester address.
    pub claim_rate_window: Duration,

    /// Redemption attempts admitted per window.
    pub claim_rate_limit: u32,

    // ========================================================================
    // Storage
    // ========================================================================
    pub storage_backend: StorageBackend,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(), // Empty = allow all
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_per_minute: 100,
            rate_limit_burst: 10,
            trust_proxy_headers: false,

            claim_rate_window: Duration::from_secs(CLAIM_RATE_WINDOW_SECS as u64),
            claim_rate_limit: 1,

            storage_backend: StorageBackend::Postgres,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MARQUEE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `MARQUEE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `MARQUEE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `MARQUEE_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `MARQUEE_RATE_LIMIT_PER_MINUTE`: Requests per minute per IP (default: 100)
    /// - `MARQUEE_RATE_LIMIT_BURST`: Burst capacity (default: 10)
    /// - `MARQUEE_TRUST_PROXY_HEADERS`: "true" or "false" (default: false)
    /// - `MARQUEE_CLAIM_RATE_LIMIT_WINDOW_SECS`: Claim window (default: 43200)
    /// - `MARQUEE_CLAIM_RATE_LIMIT_MAX`: Claims per window (default: 1)
    /// - `MARQUEE_STORAGE`: "postgres" or "memory" (default: postgres)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = std::env::var("MARQUEE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("MARQUEE_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let rate_limit_enabled = std::env::var("MARQUEE_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let trust_proxy_headers = std::env::var("MARQUEE_TRUST_PROXY_HEADERS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let claim_rate_window = env_parse::<u64>("MARQUEE_CLAIM_RATE_LIMIT_WINDOW_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.claim_rate_window);

        let storage_backend = match std::env::var("MARQUEE_STORAGE") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => StorageBackend::default(),
        };

        Ok(Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("MARQUEE_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled,
            rate_limit_per_minute: env_parse("MARQUEE_RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            rate_limit_burst: env_parse("MARQUEE_RATE_LIMIT_BURST")
                .unwrap_or(defaults.rate_limit_burst),
            trust_proxy_headers,
            claim_rate_window,
            claim_rate_limit: env_parse::<u32>("MARQUEE_CLAIM_RATE_LIMIT_MAX")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.claim_rate_limit),
            storage_backend,
        })
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain == pattern
                        || origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Sizing of the per-kind catalog page caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lifetime of a cached page.
    pub ttl: Duration,
    /// Pages held per catalog kind.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(CATALOG_PAGE_TTL_SECS),
            capacity: CATALOG_CACHE_CAPACITY,
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `MARQUEE_CACHE_TTL_SECS` (default: 300)
    /// - `MARQUEE_CACHE_CAPACITY` (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: env_parse::<u64>("MARQUEE_CACHE_TTL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
            capacity: env_parse::<usize>("MARQUEE_CACHE_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert_eq!(config.rate_limit_burst, 10);
        assert!(!config.trust_proxy_headers);
        assert_eq!(config.claim_rate_window, Duration::from_secs(12 * 60 * 60));
        assert_eq!(config.claim_rate_limit, 1);
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
    }

    #[test]
    fn test_default_cache_settings() {
        let settings = CacheSettings::default();
        assert_eq!(settings.ttl, Duration::from_secs(300));
        assert_eq!(settings.capacity, 100);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("postgres".parse(), Ok(StorageBackend::Postgres));
        assert_eq!(" Memory ".parse(), Ok(StorageBackend::Memory));
        assert!("sqlite".parse::<StorageBackend>().is_err());
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://marquee.tv".to_string(),
                "https://app.marquee.tv".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://marquee.tv"));
        assert!(config.is_origin_allowed("https://app.marquee.tv"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notmarquee.tv"));
    }

    #[test]
    fn test_wildcard_subdomain() {
        let config = ApiConfig {
            cors_origins: vec!["*.marquee.tv".to_string()],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://app.marquee.tv"));
        assert!(config.is_origin_allowed("https://marquee.tv"));
        assert!(!config.is_origin_allowed("https://evilmarquee.tv"));
        assert!(!config.is_origin_allowed("http://app.marquee.tv"));
    }
}
