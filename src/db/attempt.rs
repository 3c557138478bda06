//! Windowed attempt counters for the login throttle.

use sqlx::sqlite::SqlitePool;

/// One counter row per throttle key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRecord {
    pub key: String,
    pub count: i64,
    pub window_start: i64,
}

#[derive(Clone)]
pub struct AttemptStore {
    pool: SqlitePool,
}

impl AttemptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<AttemptRecord>, sqlx::Error> {
        let row: Option<AttemptRecord> =
            sqlx::query_as("SELECT key, count, window_start FROM attempts WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Record one attempt for `key` as a single atomic upsert, so
    /// concurrent failures from the same key cannot lose updates.
    ///
    /// A row whose window has lapsed (block window once the maximum was
    /// reached, accumulation window otherwise) restarts at count 1 instead
    /// of incrementing.
    pub async fn hit(
        &self,
        key: &str,
        now: i64,
        max: i64,
        window_secs: i64,
        block_secs: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO attempts (key, count, window_start) VALUES (?, 1, ?)
             ON CONFLICT(key) DO UPDATE SET
               count = CASE
                 WHEN (attempts.count >= ? AND attempts.window_start + ? <= ?)
                   OR (attempts.count < ? AND attempts.window_start + ? <= ?)
                 THEN 1 ELSE attempts.count + 1 END,
               window_start = CASE
                 WHEN (attempts.count >= ? AND attempts.window_start + ? <= ?)
                   OR (attempts.count < ? AND attempts.window_start + ? <= ?)
                 THEN excluded.window_start ELSE attempts.window_start END",
        )
        .bind(key)
        .bind(now)
        .bind(max)
        .bind(block_secs)
        .bind(now)
        .bind(max)
        .bind(window_secs)
        .bind(now)
        .bind(max)
        .bind(block_secs)
        .bind(now)
        .bind(max)
        .bind(window_secs)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a counter (fresh window on the next attempt).
    pub async fn delete(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attempts WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every counter whose window started before `cutoff`.
    pub async fn delete_stale(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attempts WHERE window_start < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
