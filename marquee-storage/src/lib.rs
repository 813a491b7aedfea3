//! Marquee Storage - Cache and Storage Collaborators
//!
//! Defines the expiring cache used in front of catalog reads, and the async
//! collaborator traits the services depend on. The Postgres implementation
//! lives in marquee-api; the in-memory implementations here back tests and
//! the `memory` storage backend.

pub mod cache;
pub mod memory;

pub use cache::{CacheStats, ExpiringCache};
pub use memory::{InMemoryAccountStore, InMemoryCatalogStore};

use async_trait::async_trait;
use marquee_core::{
    Account, AccountClaimState, CatalogKind, CatalogRecord, ClaimCommit, MarqueeResult, Page,
    PageRequest, Timestamp,
};
use uuid::Uuid;

// ============================================================================
// ACCOUNT STORE
// ============================================================================

/// Persistence for accounts and their claim state.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. Fails with `AlreadyExists` when the pseudo is taken.
    async fn create_account(&self, account: &Account) -> MarqueeResult<()>;

    /// Get an account by its id.
    async fn account_by_id(&self, id: Uuid) -> MarqueeResult<Option<Account>>;

    /// Load the claim state for an identity (pseudo).
    async fn load_account_state(&self, identity: &str)
        -> MarqueeResult<Option<AccountClaimState>>;

    /// Mark the account premium and record `claimed_at`, but only if its
    /// current `premium_claimed_at` still equals `expected`.
    ///
    /// Returns [`ClaimCommit::Stale`] when another claim won the race.
    async fn commit_account_claim(
        &self,
        identity: &str,
        claimed_at: Timestamp,
        expected: Option<Timestamp>,
    ) -> MarqueeResult<ClaimCommit>;

    /// Round-trip to the backing store.
    async fn health_check(&self) -> MarqueeResult<()>;
}

// ============================================================================
// CATALOG STORE
// ============================================================================

/// Read access to the movie and series catalogs.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch one page, ordered by record id.
    async fn query_page(&self, kind: CatalogKind, request: PageRequest) -> MarqueeResult<Page>;

    /// Total number of rows in a catalog.
    async fn count(&self, kind: CatalogKind) -> MarqueeResult<u64>;

    /// Get a single record by id.
    async fn record(&self, kind: CatalogKind, id: i64) -> MarqueeResult<Option<CatalogRecord>>;

    /// Round-trip to the backing store.
    async fn health_check(&self) -> MarqueeResult<()>;
}
