//! Marquee Core - Domain Types
//!
//! Plain data structures shared by every other crate in the workspace:
//! catalog pages and records, account claim state, the error taxonomy and
//! the clock abstraction used for every time-dependent decision.
//!
//! This crate contains no I/O.

pub mod account;
pub mod catalog;
pub mod clock;
pub mod error;

pub use account::{
    account_id_for, validate_pseudo, Account, AccountClaimState, ClaimCommit, MIN_PSEUDO_LEN,
};
pub use catalog::{
    total_pages, CatalogKind, CatalogRecord, Page, PageRequest, DEFAULT_PAGE, DEFAULT_PER_PAGE,
    MAX_PER_PAGE, MIN_PER_PAGE,
};
pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use error::{ConfigError, MarqueeError, MarqueeResult, StorageError, ValidationError};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// TIMING CONSTANTS
// ============================================================================

/// Lifetime of a cached catalog page (5 minutes).
pub const CATALOG_PAGE_TTL_SECS: u64 = 300;

/// Number of pages held per catalog kind before eviction kicks in.
pub const CATALOG_CACHE_CAPACITY: usize = 100;

/// Validity of an issued claim token (24 hours).
pub const CLAIM_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Minimum interval between two successful claims on one account (12 hours).
pub const CLAIM_COOLDOWN_SECS: i64 = 12 * 60 * 60;

/// Claim-redemption window per requester address (12 hours).
pub const CLAIM_RATE_WINDOW_SECS: i64 = 12 * 60 * 60;
