//! In-memory storage collaborators.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use marquee_core::{
    Account, AccountClaimState, CatalogKind, CatalogRecord, ClaimCommit, MarqueeResult, Page,
    PageRequest, StorageError, Timestamp,
};
use uuid::Uuid;

use crate::{AccountStore, CatalogStore};

fn read<T>(lock: &RwLock<T>) -> MarqueeResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> MarqueeResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}

fn check_online(offline: &AtomicBool) -> MarqueeResult<()> {
    if offline.load(Ordering::Acquire) {
        return Err(StorageError::Unavailable {
            reason: "in-memory store switched offline".to_string(),
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Accounts keyed by pseudo.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StorageError::Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    pub fn account_count(&self) -> MarqueeResult<usize> {
        Ok(read(&self.accounts)?.len())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, account: &Account) -> MarqueeResult<()> {
        check_online(&self.offline)?;
        let mut accounts = write(&self.accounts)?;
        if accounts.contains_key(&account.pseudo) {
            return Err(StorageError::AlreadyExists {
                entity: "Account".to_string(),
                id: account.pseudo.clone(),
            }
            .into());
        }
        accounts.insert(account.pseudo.clone(), account.clone());
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> MarqueeResult<Option<Account>> {
        check_online(&self.offline)?;
        let accounts = read(&self.accounts)?;
        Ok(accounts.values().find(|a| a.id == id).cloned())
    }

    async fn load_account_state(
        &self,
        identity: &str,
    ) -> MarqueeResult<Option<AccountClaimState>> {
        check_online(&self.offline)?;
        let accounts = read(&self.accounts)?;
        Ok(accounts.get(identity).map(Account::claim_state))
    }

    async fn commit_account_claim(
        &self,
        identity: &str,
        claimed_at: Timestamp,
        expected: Option<Timestamp>,
    ) -> MarqueeResult<ClaimCommit> {
        check_online(&self.offline)?;
        let mut accounts = write(&self.accounts)?;
        let account = accounts
            .get_mut(identity)
            .ok_or_else(|| StorageError::not_found("Account", identity))?;

        if account.premium_claimed_at != expected {
            return Ok(ClaimCommit::Stale);
        }

        account.is_premium = true;
        account.premium_claimed_at = Some(claimed_at);
        Ok(ClaimCommit::Committed(account.claim_state()))
    }

    async fn health_check(&self) -> MarqueeResult<()> {
        check_online(&self.offline)?;
        read(&self.accounts).map(|_| ())
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// Catalog rows per kind, ordered by id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogStore {
    tables: Arc<RwLock<HashMap<CatalogKind, BTreeMap<i64, CatalogRecord>>>>,
    page_queries: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, kind: CatalogKind, record: CatalogRecord) -> MarqueeResult<()> {
        write(&self.tables)?
            .entry(kind)
            .or_default()
            .insert(record.id, record);
        Ok(())
    }

    /// Number of `query_page` calls served so far.
    pub fn page_queries(&self) -> u64 {
        self.page_queries.load(Ordering::Relaxed)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn query_page(&self, kind: CatalogKind, request: PageRequest) -> MarqueeResult<Page> {
        check_online(&self.offline)?;
        self.page_queries.fetch_add(1, Ordering::Relaxed);

        let tables = read(&self.tables)?;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = tables
            .get(&kind)
            .map(|rows| {
                rows.values()
                    .skip(offset)
                    .take(request.per_page as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Page {
            page: request.page,
            per_page: request.per_page,
            items,
        })
    }

    async fn count(&self, kind: CatalogKind) -> MarqueeResult<u64> {
        check_online(&self.offline)?;
        let tables = read(&self.tables)?;
        Ok(tables.get(&kind).map_or(0, |rows| rows.len() as u64))
    }

    async fn record(&self, kind: CatalogKind, id: i64) -> MarqueeResult<Option<CatalogRecord>> {
        check_online(&self.offline)?;
        let tables = read(&self.tables)?;
        Ok(tables.get(&kind).and_then(|rows| rows.get(&id)).cloned())
    }

    async fn health_check(&self) -> MarqueeResult<()> {
        check_online(&self.offline)?;
        read(&self.tables).map(|_| ())
    }
}

// ============================================================================
// TESTS
// ============================================================================
