//! Bounded in-memory cache with per-entry expiry.
//!
//! [`ExpiringCache`] never hands out an entry whose expiry time has passed.
//! Expired entries are dropped lazily when they are looked up, when room is
//! needed for a new key, or when a caller runs [`ExpiringCache::purge_expired`].
//!
//! # Example
//!
//! ```ignore
//! let cache = ExpiringCache::new(100, Arc::new(SystemClock));
//! cache.set(("movies", 1), page, Duration::from_secs(300))?;
//! assert!(cache.get(&("movies", 1))?.is_some());
//! ```

pub mod expiring;
pub mod traits;

pub use expiring::ExpiringCache;
pub use traits::CacheStats;
