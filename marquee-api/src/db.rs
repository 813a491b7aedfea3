//! Database Connection Pool Module
//!
//! PostgreSQL collaborator for accounts and catalogs, built on a
//! deadpool-postgres connection pool. [`DbClient`] implements both
//! [`AccountStore`] and [`CatalogStore`].
//!
//! The pool is created with wait, create and recycle timeouts, so an
//! exhausted or unreachable database surfaces as
//! `StorageError::Unavailable` instead of a hung request.

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use marquee_core::{
    Account, AccountClaimState, CatalogKind, CatalogRecord, ClaimCommit, MarqueeError,
    MarqueeResult, Page, PageRequest, StorageError, Timestamp,
};
use marquee_storage::{AccountStore, CatalogStore};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio_postgres::{error::SqlState, NoTls, Row};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const INIT_MIGRATION: &str = include_str!("../migrations/001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long a request waits for a free connection
    pub wait_timeout: Duration,
    /// How long opening a new connection may take
    pub create_timeout: Duration,
    /// How long recycling a returned connection may take
    pub recycle_timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("wait_timeout", &self.wait_timeout)
            .field("create_timeout", &self.create_timeout)
            .field("recycle_timeout", &self.recycle_timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "marquee".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            wait_timeout: Duration::from_secs(5),
            create_timeout: Duration::from_secs(5),
            recycle_timeout: Duration::from_secs(2),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// - `MARQUEE_DB_HOST`, `MARQUEE_DB_PORT`, `MARQUEE_DB_NAME`,
    ///   `MARQUEE_DB_USER`, `MARQUEE_DB_PASSWORD`
    /// - `MARQUEE_DB_POOL_SIZE` (default: 16)
    /// - `MARQUEE_DB_WAIT_TIMEOUT_SECS` (default: 5)
    /// - `MARQUEE_DB_CREATE_TIMEOUT_SECS` (default: 5)
    /// - `MARQUEE_DB_RECYCLE_TIMEOUT_SECS` (default: 2)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("MARQUEE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("MARQUEE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("MARQUEE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("MARQUEE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("MARQUEE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("MARQUEE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_size),
            wait_timeout: env_secs("MARQUEE_DB_WAIT_TIMEOUT_SECS", defaults.wait_timeout),
            create_timeout: env_secs("MARQUEE_DB_CREATE_TIMEOUT_SECS", defaults.create_timeout),
            recycle_timeout: env_secs("MARQUEE_DB_RECYCLE_TIMEOUT_SECS", defaults.recycle_timeout),
        }
    }

    /// Create a connection pool from this configuration. No connection is
    /// opened until the first checkout.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(self.wait_timeout);
        timeouts.create = Some(self.create_timeout);
        timeouts.recycle = Some(self.recycle_timeout);

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = timeouts;
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> MarqueeError {
    let reason = err.to_string();
    match err {
        // Backend errors here mean a new connection could not be opened.
        PoolError::Timeout(_) | PoolError::Closed | PoolError::Backend(_) => {
            StorageError::Unavailable { reason }.into()
        }
        _ => StorageError::QueryFailed { reason }.into(),
    }
}

fn query_error(err: tokio_postgres::Error) -> MarqueeError {
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

fn malformed(entity: &str, err: impl std::fmt::Display) -> MarqueeError {
    StorageError::MalformedRow {
        entity: entity.to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn account_from_row(row: &Row) -> MarqueeResult<Account> {
    Ok(Account {
        id: row.try_get("id").map_err(|e| malformed("Account", e))?,
        pseudo: row.try_get("pseudo").map_err(|e| malformed("Account", e))?,
        created_at: row.try_get("created_at").map_err(|e| malformed("Account", e))?,
        is_premium: row.try_get("is_premium").map_err(|e| malformed("Account", e))?,
        premium_claimed_at: row
            .try_get("premium_claimed_at")
            .map_err(|e| malformed("Account", e))?,
    })
}

fn claim_state_from_row(row: &Row) -> MarqueeResult<AccountClaimState> {
    Ok(AccountClaimState {
        identity: row.try_get("pseudo").map_err(|e| malformed("Account", e))?,
        is_premium: row.try_get("is_premium").map_err(|e| malformed("Account", e))?,
        premium_claimed_at: row
            .try_get("premium_claimed_at")
            .map_err(|e| malformed("Account", e))?,
    })
}

fn record_from_row(kind: CatalogKind, row: &Row) -> MarqueeResult<CatalogRecord> {
    let json: JsonValue = row.try_get(0).map_err(|e| malformed(kind.as_str(), e))?;
    serde_json::from_value(json).map_err(|e| malformed(kind.as_str(), e))
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> MarqueeResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the account and catalog tables if they are missing.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(INIT_MIGRATION)
            .await
            .map_err(query_error)?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl AccountStore for DbClient {
    async fn create_account(&self, account: &Account) -> MarqueeResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO accounts (id, pseudo, created_at, is_premium, premium_claimed_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &account.id,
                &account.pseudo,
                &account.created_at,
                &account.is_premium,
                &account.premium_claimed_at,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                StorageError::AlreadyExists {
                    entity: "Account".to_string(),
                    id: account.pseudo.clone(),
                }
                .into()
            } else {
                query_error(e)
            }
        })?;
        Ok(())
    }

    async fn account_by_id(&self, id: Uuid) -> MarqueeResult<Option<Account>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, pseudo, created_at, is_premium, premium_claimed_at \
                 FROM accounts WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(query_error)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn load_account_state(
        &self,
        identity: &str,
    ) -> MarqueeResult<Option<AccountClaimState>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT pseudo, is_premium, premium_claimed_at FROM accounts WHERE pseudo = $1",
                &[&identity],
            )
            .await
            .map_err(query_error)?;
        row.as_ref().map(claim_state_from_row).transpose()
    }

    async fn commit_account_claim(
        &self,
        identity: &str,
        claimed_at: Timestamp,
        expected: Option<Timestamp>,
    ) -> MarqueeResult<ClaimCommit> {
        let conn = self.get_conn().await?;
        let updated = conn
            .query_opt(
                "UPDATE accounts SET is_premium = TRUE, premium_claimed_at = $2 \
                 WHERE pseudo = $1 AND premium_claimed_at IS NOT DISTINCT FROM $3 \
                 RETURNING pseudo, is_premium, premium_claimed_at",
                &[&identity, &claimed_at, &expected],
            )
            .await
            .map_err(query_error)?;

        if let Some(row) = updated {
            return Ok(ClaimCommit::Committed(claim_state_from_row(&row)?));
        }

        let exists = conn
            .query_opt("SELECT 1 FROM accounts WHERE pseudo = $1", &[&identity])
            .await
            .map_err(query_error)?
            .is_some();

        if exists {
            Ok(ClaimCommit::Stale)
        } else {
            Err(StorageError::not_found("Account", identity).into())
        }
    }

    async fn health_check(&self) -> MarqueeResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(query_error)?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for DbClient {
    async fn query_page(&self, kind: CatalogKind, request: PageRequest) -> MarqueeResult<Page> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT row_to_json(t.*) FROM {} t ORDER BY t.id LIMIT $1 OFFSET $2",
            kind.table_name()
        );
        let limit = i64::from(request.per_page);
        let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);

        let rows = conn
            .query(&sql, &[&limit, &offset])
            .await
            .map_err(query_error)?;

        let items = rows
            .iter()
            .map(|row| record_from_row(kind, row))
            .collect::<MarqueeResult<Vec<_>>>()?;

        Ok(Page {
            page: request.page,
            per_page: request.per_page,
            items,
        })
    }

    async fn count(&self, kind: CatalogKind) -> MarqueeResult<u64> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table_name());
        let row = conn.query_one(&sql, &[]).await.map_err(query_error)?;
        let count: i64 = row.try_get(0).map_err(|e| malformed(kind.as_str(), e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn record(&self, kind: CatalogKind, id: i64) -> MarqueeResult<Option<CatalogRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT row_to_json(t.*) FROM {} t WHERE t.id = $1",
            kind.table_name()
        );
        let row = conn.query_opt(&sql, &[&id]).await.map_err(query_error)?;
        row.as_ref().map(|r| record_from_row(kind, r)).transpose()
    }

    async fn health_check(&self) -> MarqueeResult<()> {
        AccountStore::health_check(self).await
    }
}
