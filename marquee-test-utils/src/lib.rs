//! Marquee Test Utilities
//!
//! Shared test infrastructure for the Marquee workspace:
//! - Proptest generators for domain types
//! - Fixtures for a seeded catalog and a known account
//! - Re-exports of the in-memory stores and manual clock

// Re-export in-memory collaborators from their source crate
pub use marquee_storage::{InMemoryAccountStore, InMemoryCatalogStore};

// Re-export core types for convenience
pub use marquee_core::{
    account_id_for, Account, AccountClaimState, CatalogKind, CatalogRecord, ClaimCommit, Clock,
    FixedClock, ManualClock, MarqueeError, MarqueeResult, Page, PageRequest, StorageError,
    SystemClock, Timestamp,
};

use chrono::{TimeZone, Utc};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Marquee domain types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a pseudo that passes validation (3 to 16 ASCII word chars).
    pub fn arb_pseudo() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,15}"
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_catalog_kind() -> impl Strategy<Value = CatalogKind> {
        prop_oneof![Just(CatalogKind::Movies), Just(CatalogKind::Series)]
    }

    /// Generate a catalog record with a title and a year.
    pub fn arb_catalog_record() -> impl Strategy<Value = CatalogRecord> {
        (1i64..100_000, "[A-Z][a-z]{2,12}", 1950i64..2030).prop_map(|(id, title, year)| {
            CatalogRecord::new(id)
                .with_attribute("title", title)
                .with_attribute("year", year)
        })
    }

    /// Generate a valid page request.
    pub fn arb_page_request() -> impl Strategy<Value = PageRequest> {
        (1i64..200, 1i64..=50).prop_filter_map("valid page request", |(page, per_page)| {
            PageRequest::new(page, per_page).ok()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    /// Movies in [`seeded_catalog`].
    pub const SEEDED_MOVIES: i64 = 60;

    /// Series in [`seeded_catalog`].
    pub const SEEDED_SERIES: i64 = 20;

    /// 2024-06-01 08:00:00 UTC, the reference instant for fixtures.
    pub fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Manual clock starting at [`t0`].
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(t0())
    }

    /// A fresh, never-claimed account for "alice".
    pub fn alice_account() -> Account {
        Account::new("alice", t0())
    }

    /// Catalog with ids `1..=SEEDED_MOVIES` in movies and `1..=SEEDED_SERIES`
    /// in series, each record titled after its id.
    pub fn seeded_catalog() -> MarqueeResult<InMemoryCatalogStore> {
        let store = InMemoryCatalogStore::new();
        for id in 1..=SEEDED_MOVIES {
            store.insert(
                CatalogKind::Movies,
                CatalogRecord::new(id)
                    .with_attribute("title", format!("Movie {}", id))
                    .with_attribute("year", 1980 + id % 40),
            )?;
        }
        for id in 1..=SEEDED_SERIES {
            store.insert(
                CatalogKind::Series,
                CatalogRecord::new(id)
                    .with_attribute("title", format!("Series {}", id))
                    .with_attribute("seasons", 1 + id % 7),
            )?;
        }
        Ok(store)
    }
}
