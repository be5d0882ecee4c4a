use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database
    #[error("Another instance of newscache appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if is_lock_message(&error_string) || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

pub(crate) fn is_lock_message(lowercase: &str) -> bool {
    lowercase.contains("database is locked")
        || lowercase.contains("database table is locked")
        || lowercase.contains("sqlite_busy")
        || lowercase.contains("sqlite_locked")
}

// ============================================================================
// Helper Types
// ============================================================================

/// An article decoded from the remote API that has not been written yet.
///
/// `cached_at` is assigned by the store at write time and new articles are
/// never favorites, so neither field exists here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    /// Canonical article URL, also used as the identity key
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    /// Unix timestamp (seconds)
    pub published_at: i64,
    pub url: String,
}

impl NewArticle {
    /// View of a fetched article that is returned to the caller but not stored.
    pub fn into_unsaved(self, fetched_at: i64) -> Article {
        Article {
            id: self.id,
            title: self.title,
            summary: self.summary,
            image_url: self.image_url,
            source: self.source,
            published_at: self.published_at,
            url: self.url,
            is_favorite: false,
            cached_at: fetched_at,
        }
    }
}

/// Internal row type for Article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub published_at: i64,
    pub url: String,
    pub is_favorite: bool,
    pub cached_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            title: self.title,
            summary: self.summary,
            image_url: self.image_url,
            source: self.source,
            published_at: self.published_at,
            url: self.url,
            is_favorite: self.is_favorite,
            cached_at: self.cached_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Article as stored in the cache
///
/// `published_at` and `cached_at` are Unix timestamps in seconds. `cached_at`
/// records when the row was first written and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub source: Option<String>,
    pub published_at: i64,
    pub url: String,
    pub is_favorite: bool,
    pub cached_at: i64,
}

impl Article {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.published_at, 0)
    }

    pub fn cached(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.cached_at, 0)
    }
}
