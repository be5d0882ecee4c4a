use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};
use std::collections::{HashMap, HashSet};

use super::schema::Database;
use super::store::ArticleStore;
use super::types::{Article, ArticleDbRow, NewArticle};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles returned by the freshness query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

/// 8 bound columns * 50 rows stays well under SQLite's 999 parameter limit
const BATCH_SIZE: usize = 50;

/// Batch size for `id IN (...)` lookups
const LOOKUP_CHUNK: usize = 500;

const ARTICLE_COLUMNS: &str =
    "id, title, summary, image_url, source, published_at, url, is_favorite, cached_at";

impl ArticleStore for Database {
    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Insert-or-ignore inside one transaction.
    ///
    /// A row that already exists keeps everything it had, so a favorite
    /// re-delivered by the API stays a favorite and keeps its original
    /// `cached_at`.
    async fn insert_articles(&self, articles: &[NewArticle]) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let inserted = insert_batch(&mut tx, articles, now).await?;
        tx.commit().await?;

        tracing::debug!(
            offered = articles.len(),
            inserted = inserted,
            "Inserted articles"
        );
        Ok(inserted)
    }

    async fn set_favorite(&self, id: &str, value: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE articles SET is_favorite = ? WHERE id = ?")
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;

        let found = result.rows_affected() > 0;
        if !found {
            tracing::debug!(id = %id, "set_favorite on unknown article ignored");
        }
        Ok(found)
    }

    async fn evict_expired(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        evict_before(&mut conn, cutoff.timestamp()).await
    }

    /// Eviction and insertion share one transaction: dropping the future or
    /// failing midway rolls both back.
    async fn merge_page(
        &self,
        articles: &[NewArticle],
        evict_before_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Article>> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let evicted = match evict_before_cutoff {
            Some(cutoff) => evict_before(&mut tx, cutoff.timestamp()).await?,
            None => 0,
        };
        let inserted = insert_batch(&mut tx, articles, now).await?;

        let mut seen = HashSet::new();
        let ids: Vec<&str> = articles
            .iter()
            .map(|a| a.id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();
        let stored = select_by_ids(&mut tx, &ids).await?;

        tx.commit().await?;

        tracing::debug!(
            evicted = evicted,
            inserted = inserted,
            returned = stored.len(),
            "Merged fetched page into cache"
        );
        Ok(stored)
    }

    async fn clear_favorites(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE articles SET is_favorite = 0 WHERE is_favorite = 1")
            .execute(&self.pool)
            .await?;
        tracing::info!(cleared = result.rows_affected(), "Cleared favorites");
        Ok(result.rows_affected())
    }

    async fn clear_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles")
            .execute(&self.pool)
            .await?;
        tracing::info!(deleted = result.rows_affected(), "Cleared article cache");
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// Hard cap at MAX_ARTICLES regardless of the requested limit.
    async fn cached_feed(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<Article>> {
        let limit = limit.clamp(0, MAX_ARTICLES);
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE cached_at > ?
            ORDER BY published_at DESC, cached_at DESC
            LIMIT ?
        "#
        ))
        .bind(cutoff.timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    async fn favorites(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, ArticleDbRow>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE is_favorite = 1
            ORDER BY published_at DESC, cached_at DESC
        "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }
}

// ============================================================================
// Connection-level helpers (shared by single calls and merge_page)
// ============================================================================

async fn insert_batch(
    conn: &mut SqliteConnection,
    articles: &[NewArticle],
    now: i64,
) -> Result<usize> {
    let mut total_inserted: usize = 0;

    for chunk in articles.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "INSERT OR IGNORE INTO articles \
             (id, title, summary, image_url, source, published_at, url, cached_at) ",
        );
        builder.push_values(chunk, |mut b, article| {
            b.push_bind(&article.id)
                .push_bind(&article.title)
                .push_bind(&article.summary)
                .push_bind(&article.image_url)
                .push_bind(&article.source)
                .push_bind(article.published_at)
                .push_bind(&article.url)
                .push_bind(now);
        });

        let result = builder.build().execute(&mut *conn).await?;
        total_inserted += result.rows_affected() as usize;
    }

    Ok(total_inserted)
}

async fn evict_before(conn: &mut SqliteConnection, cutoff: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM articles WHERE cached_at < ? AND is_favorite = 0")
        .bind(cutoff)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(
            evicted = result.rows_affected(),
            cutoff = cutoff,
            "Evicted expired articles"
        );
    }
    Ok(result.rows_affected())
}

/// Fetch rows for `ids`, returned in the order of `ids`. Missing ids are skipped.
async fn select_by_ids(conn: &mut SqliteConnection, ids: &[&str]) -> Result<Vec<Article>> {
    let mut by_id: HashMap<String, Article> = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id IN ("));
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<ArticleDbRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
        for row in rows {
            by_id.insert(row.id.clone(), row.into_article());
        }
    }

    Ok(ids.iter().filter_map(|id| by_id.remove(*id)).collect())
}
