use anyhow::Result;

use super::schema::Database;
use super::store::PreferenceStore;

const UPSERT_PREFERENCE: &str = r#"
    INSERT INTO user_preferences (key, value, updated_at)
    VALUES (?, ?, datetime('now'))
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

impl PreferenceStore for Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `budget.daily_count`, `budget.last_request`.
    async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_PREFERENCE)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Set several preference values in one transaction.
    async fn set_preferences(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(UPSERT_PREFERENCE)
                .bind(*key)
                .bind(value.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
