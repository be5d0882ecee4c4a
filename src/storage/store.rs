//! Storage capabilities consumed by the budget tracker and the sync layer.
//!
//! [`Database`](super::Database) implements both traits over SQLite. Any other
//! backend (an in-memory index, a file-backed table) can stand in as long as
//! every mutation is atomic with respect to its own readers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::future::Future;

use super::types::{Article, NewArticle};

/// Persistent collection of cached articles.
pub trait ArticleStore: Send + Sync {
    /// Insert articles that are not already stored.
    ///
    /// Existing ids are left untouched, including their favorite flag and
    /// `cached_at`. Returns the number of rows actually inserted.
    fn insert_articles(
        &self,
        articles: &[NewArticle],
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Set the favorite flag. Returns `false` if no article has this id.
    fn set_favorite(&self, id: &str, value: bool) -> impl Future<Output = Result<bool>> + Send;

    fn get_article(&self, id: &str) -> impl Future<Output = Result<Option<Article>>> + Send;

    /// Articles cached strictly after `cutoff`, newest publication first.
    fn cached_feed(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// All favorites, newest publication first.
    fn favorites(&self) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// Delete non-favorite articles cached before `cutoff`.
    fn evict_expired(&self, cutoff: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send;

    /// Atomically evict (when `evict_before` is set) and insert one fetched page.
    ///
    /// Returns the stored rows for `articles` in input order, duplicates removed.
    /// Nothing is applied if any step fails.
    fn merge_page(
        &self,
        articles: &[NewArticle],
        evict_before: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// Drop the favorite flag from every article, keeping the articles.
    /// Returns the number of articles that were favorites.
    fn clear_favorites(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Delete every article, favorites included.
    fn clear_all(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// String key-value persistence.
pub trait PreferenceStore: Send + Sync {
    fn get_preference(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set_preference(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Write several entries. Implementations should apply them atomically.
    fn set_preferences(
        &self,
        entries: &[(&str, String)],
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            for (key, value) in entries {
                self.set_preference(key, value).await?;
            }
            Ok(())
        }
    }
}
