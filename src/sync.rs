//! Cache/network policy for the article feed and search.
//!
//! [`ArticleSync`] decides per call whether to answer from the local cache or
//! the remote API, charges successful remote calls to the daily budget, and
//! merges fetched pages into the store.
//!
//! Each `load_feed`/`search` call runs under one lock from admission to merge,
//! so two calls never interleave their read-modify-write sequences. A call
//! whose future is dropped before the merge commits leaves the store as it was.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::budget::BudgetTracker;
use crate::config::Config;
use crate::news::{ArticleSource, Endpoint, FetchError, HeadlineParams, SearchParams};
use crate::storage::{Article, ArticleStore, NewArticle, PreferenceStore};

/// Number of articles the page-1 cache read returns.
pub const CACHED_FEED_LIMIT: i64 = 20;

// ============================================================================
// Error Types
// ============================================================================

/// Where a rate limit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOrigin {
    /// Local daily budget exhausted; the network was not touched
    Local,
    /// The API answered 429
    Upstream,
}

impl std::fmt::Display for RateLimitOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitOrigin::Local => {
                f.write_str("Daily request limit reached. Please retry tomorrow.")
            }
            RateLimitOrigin::Upstream => f.write_str("Rate limit hit. Please retry later."),
        }
    }
}

/// Failure of a sync operation. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid API key. Please check your configuration.")]
    Unauthorized,

    #[error("{0}")]
    RateLimited(RateLimitOrigin),

    #[error("Invalid request. Please check your search terms.")]
    BadRequest,

    #[error("Server error (status {0}). Please try again later.")]
    ServerError(u16),

    #[error("Failed to process response from server: {0}")]
    Decoding(String),

    #[error("An unexpected error occurred: {0}")]
    Unknown(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SyncError::RateLimited(_))
    }

    fn storage(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{err:#}"))
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::BadRequest => SyncError::BadRequest,
            FetchError::Unauthorized => SyncError::Unauthorized,
            FetchError::RateLimited => SyncError::RateLimited(RateLimitOrigin::Upstream),
            FetchError::ServerError(status) => SyncError::ServerError(status),
            FetchError::Decoding(msg) => SyncError::Decoding(msg),
            other @ (FetchError::UnexpectedStatus(_)
            | FetchError::Network(_)
            | FetchError::ResponseTooLarge(_)
            | FetchError::InsecureBaseUrl
            | FetchError::InvalidBaseUrl(_)
            | FetchError::InvalidApiKey
            | FetchError::MissingApiKey) => SyncError::Unknown(other.to_string()),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Parameters the sync layer takes from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub country: String,
    pub page_size: u32,
    /// Freshness window for cached articles
    pub cache_duration: TimeDelta,
    pub cached_feed_limit: i64,
    pub persist_search_results: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            country: config.country.clone(),
            page_size: config.page_size,
            cache_duration: TimeDelta::hours(i64::from(config.cache_duration_hours)),
            cached_feed_limit: CACHED_FEED_LIMIT,
            persist_search_results: config.persist_search_results,
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Tracks which feed page to request next.
///
/// An empty page ends pagination until [`FeedCursor::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    next_page: u32,
    exhausted: bool,
}

impl Default for FeedCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedCursor {
    pub fn new() -> Self {
        Self {
            next_page: 1,
            exhausted: false,
        }
    }

    /// Page to load next, or `None` once an empty page was seen.
    pub fn next_page(&self) -> Option<u32> {
        (!self.exhausted).then_some(self.next_page)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record the size of the page just loaded.
    pub fn advance(&mut self, page_len: usize) {
        if page_len == 0 {
            self.exhausted = true;
        } else {
            self.next_page = self.next_page.saturating_add(1);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Mediates between the remote article source and the local cache.
pub struct ArticleSync<St, Src, P> {
    store: St,
    source: Src,
    budget: BudgetTracker<P>,
    settings: SyncSettings,
    lock: Mutex<()>,
}

impl<St, Src, P> ArticleSync<St, Src, P>
where
    St: ArticleStore,
    Src: ArticleSource,
    P: PreferenceStore,
{
    pub fn new(store: St, source: Src, budget: BudgetTracker<P>, settings: SyncSettings) -> Self {
        Self {
            store,
            source,
            budget,
            settings,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn budget(&self) -> &BudgetTracker<P> {
        &self.budget
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Load one page of the headline feed.
    ///
    /// Page 1 is answered from the cache whenever the cache holds any fresh
    /// article, without a network call and without spending budget. Every
    /// other case fetches, charges the budget on success, and merges the
    /// page (evicting expired non-favorites first when `page == 1`).
    ///
    /// # Errors
    ///
    /// - [`SyncError::RateLimited`] with [`RateLimitOrigin::Local`] when the
    ///   daily budget is spent (checked before the cache)
    /// - classified fetch errors, in which case no budget is consumed
    /// - [`SyncError::Storage`] if the merge fails; nothing is applied
    pub async fn load_feed(&self, page: u32) -> Result<Vec<Article>, SyncError> {
        let page = page.max(1);
        let _guard = self.lock.lock().await;

        self.admit().await?;

        if page == 1 {
            let cached = self.read_cached_feed().await?;
            if !cached.is_empty() {
                tracing::debug!(count = cached.len(), "Serving page 1 from cache");
                return Ok(cached);
            }
        }

        let params = HeadlineParams {
            country: self.settings.country.clone(),
            page_size: self.settings.page_size,
            page,
            query: None,
        };
        let fetched = self.fetch_counted(&Endpoint::top_headlines(&params)).await?;

        let evict_before = (page == 1).then(|| self.freshness_cutoff());
        let merged = self
            .store
            .merge_page(&fetched, evict_before)
            .await
            .map_err(SyncError::storage)?;

        tracing::info!(page = page, count = merged.len(), "Loaded feed page");
        Ok(merged)
    }

    /// Full-text search. Never served from cache.
    ///
    /// A blank query falls back to [`ArticleSync::load_feed`].
    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<Article>, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            return self.load_feed(page).await;
        }

        let page = page.max(1);
        let _guard = self.lock.lock().await;

        self.admit().await?;

        let mut params = SearchParams::new(query, page);
        params.page_size = self.settings.page_size;
        let fetched = self.fetch_counted(&Endpoint::everything(&params)).await?;

        let results = if self.settings.persist_search_results {
            self.store
                .merge_page(&fetched, None)
                .await
                .map_err(SyncError::storage)?
        } else {
            let fetched_at = Utc::now().timestamp();
            fetched
                .into_iter()
                .map(|a| a.into_unsaved(fetched_at))
                .collect()
        };

        tracing::info!(
            page = page,
            count = results.len(),
            persisted = self.settings.persist_search_results,
            "Search completed"
        );
        Ok(results)
    }

    /// Load the page a cursor points at and advance it.
    ///
    /// Returns an empty list without any I/O once the cursor is exhausted.
    /// Errors leave the cursor where it was.
    pub async fn load_next(&self, cursor: &mut FeedCursor) -> Result<Vec<Article>, SyncError> {
        let Some(page) = cursor.next_page() else {
            return Ok(Vec::new());
        };
        let articles = self.load_feed(page).await?;
        cursor.advance(articles.len());
        Ok(articles)
    }

    /// Local-only favorite toggle. Returns `false` for an unknown id.
    pub async fn set_favorite(&self, id: &str, value: bool) -> Result<bool, SyncError> {
        let found = self
            .store
            .set_favorite(id, value)
            .await
            .map_err(SyncError::storage)?;
        tracing::debug!(id = %id, favorite = value, found = found, "Favorite updated");
        Ok(found)
    }

    pub async fn favorites(&self) -> Result<Vec<Article>, SyncError> {
        self.store.favorites().await.map_err(SyncError::storage)
    }

    pub async fn get_article(&self, id: &str) -> Result<Option<Article>, SyncError> {
        self.store.get_article(id).await.map_err(SyncError::storage)
    }

    /// Fresh articles currently in the cache, newest publication first.
    pub async fn cached_feed(&self) -> Result<Vec<Article>, SyncError> {
        self.read_cached_feed().await
    }

    pub async fn remaining_requests(&self) -> Result<u32, SyncError> {
        self.budget
            .remaining_requests()
            .await
            .map_err(SyncError::storage)
    }

    pub async fn is_rate_limited(&self) -> Result<bool, SyncError> {
        self.budget
            .is_rate_limited()
            .await
            .map_err(SyncError::storage)
    }

    pub async fn reset_rate_limit(&self) -> Result<(), SyncError> {
        self.budget
            .reset_daily_count()
            .await
            .map_err(SyncError::storage)
    }

    /// Unfavorite every article. The articles stay cached and become subject
    /// to normal expiry.
    pub async fn clear_favorites(&self) -> Result<u64, SyncError> {
        let cleared = self
            .store
            .clear_favorites()
            .await
            .map_err(SyncError::storage)?;
        tracing::debug!(cleared = cleared, "Favorites cleared");
        Ok(cleared)
    }

    /// Drop every cached article, favorites included.
    pub async fn clear_cache(&self) -> Result<u64, SyncError> {
        let _guard = self.lock.lock().await;
        self.store.clear_all().await.map_err(SyncError::storage)
    }

    // ========================================================================
    // Steps
    // ========================================================================

    async fn admit(&self) -> Result<(), SyncError> {
        let allowed = self
            .budget
            .can_make_request()
            .await
            .map_err(SyncError::storage)?;
        if !allowed {
            tracing::warn!(
                max_daily = self.budget.max_daily(),
                "Daily request budget exhausted"
            );
            return Err(SyncError::RateLimited(RateLimitOrigin::Local));
        }
        Ok(())
    }

    /// Fetch, and charge the budget only if the fetch succeeded.
    async fn fetch_counted(&self, endpoint: &Endpoint) -> Result<Vec<NewArticle>, SyncError> {
        let response = match self.source.fetch(endpoint).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(path = endpoint.path, error = %e, "Fetch failed");
                return Err(e.into());
            }
        };
        self.budget
            .record_request()
            .await
            .map_err(SyncError::storage)?;
        Ok(response.into_articles())
    }

    async fn read_cached_feed(&self) -> Result<Vec<Article>, SyncError> {
        self.store
            .cached_feed(self.freshness_cutoff(), self.settings.cached_feed_limit)
            .await
            .map_err(SyncError::storage)
    }

    /// Oldest `cached_at` still counted as fresh. Saturates at the earliest
    /// representable instant for very long windows.
    fn freshness_cutoff(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_sub_signed(self.settings.cache_duration)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
