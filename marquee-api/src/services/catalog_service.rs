//! Catalog Query Service
//!
//! Serves catalog pages through one expiring cache per catalog kind and
//! falls back to the catalog store on a miss.

use std::sync::Arc;
use std::time::Duration;

use marquee_core::{
    catalog::validate_per_page, total_pages, CatalogKind, CatalogRecord, Clock, Page, PageRequest,
    StorageError,
};
use marquee_storage::{CacheStats, CatalogStore, ExpiringCache};

use crate::config::CacheSettings;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::with_metrics;

/// Cache key for a catalog page.
pub type PageCacheKey = (CatalogKind, u32);

/// Key a page request is cached under.
///
/// `per_page` is deliberately not part of the key: a page cached at one size
/// is served for every other size until it expires.
pub fn page_cache_key(kind: CatalogKind, request: &PageRequest) -> PageCacheKey {
    (kind, request.page)
}

/// Cached read access to the movie and series catalogs.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    movies: ExpiringCache<PageCacheKey, Arc<Page>>,
    series: ExpiringCache<PageCacheKey, Arc<Page>>,
    ttl: Duration,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("store", &"<CatalogStore>")
            .field("movies", &self.movies)
            .field("series", &self.series)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            movies: ExpiringCache::new(settings.capacity, Arc::clone(&clock)),
            series: ExpiringCache::new(settings.capacity, clock),
            ttl: settings.ttl,
        }
    }

    fn cache_for(&self, kind: CatalogKind) -> &ExpiringCache<PageCacheKey, Arc<Page>> {
        match kind {
            CatalogKind::Movies => &self.movies,
            CatalogKind::Series => &self.series,
        }
    }

    /// Fetch one page, from the cache when a live entry exists.
    ///
    /// # Errors
    /// `InvalidRange` for `page < 1` or `per_page` outside `[1, 50]`, and
    /// whatever the store reports on a miss.
    pub async fn fetch(&self, kind: CatalogKind, page: i64, per_page: i64) -> ApiResult<Arc<Page>> {
        let request = PageRequest::new(page, per_page)?;
        let key = page_cache_key(kind, &request);
        let cache = self.cache_for(kind);

        if let Some(cached) = cache.get(&key)? {
            with_metrics(|m| m.record_cache_lookup(kind.as_str(), true));
            tracing::debug!(kind = %kind, page = request.page, "Catalog cache hit");
            return Ok(cached);
        }

        with_metrics(|m| m.record_cache_lookup(kind.as_str(), false));
        tracing::debug!(
            kind = %kind,
            page = request.page,
            per_page = request.per_page,
            "Catalog cache miss"
        );

        let fresh = Arc::new(self.store.query_page(kind, request).await?);
        if let Some(evicted) = cache.set(key, Arc::clone(&fresh), self.ttl)? {
            tracing::debug!(kind = %kind, evicted_page = evicted.1, "Catalog cache full, evicted page");
        }

        Ok(fresh)
    }

    /// Pages needed to list the whole catalog at `per_page` rows each. Uncached.
    pub async fn total_pages(&self, kind: CatalogKind, per_page: i64) -> ApiResult<u64> {
        let per_page = validate_per_page(per_page)?;
        let rows = self.store.count(kind).await?;
        Ok(total_pages(rows, per_page))
    }

    /// Single record by id. Uncached.
    pub async fn record(&self, kind: CatalogKind, id: i64) -> ApiResult<CatalogRecord> {
        self.store
            .record(kind, id)
            .await?
            .ok_or_else(|| ApiError::from(StorageError::not_found(kind_entity(kind), id)))
    }

    /// Drop expired pages from both caches. Returns how many were removed.
    pub fn purge_expired(&self) -> ApiResult<usize> {
        Ok(self.movies.purge_expired()? + self.series.purge_expired()?)
    }

    pub fn stats(&self, kind: CatalogKind) -> ApiResult<CacheStats> {
        Ok(self.cache_for(kind).stats()?)
    }

    /// Round-trip to the catalog store.
    pub async fn health_check(&self) -> ApiResult<()> {
        Ok(self.store.health_check().await?)
    }
}

fn kind_entity(kind: CatalogKind) -> &'static str {
    match kind {
        CatalogKind::Movies => "Movie",
        CatalogKind::Series => "Series",
    }
}
