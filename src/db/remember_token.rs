//! Remember-me token storage.
//!
//! The selector is a public lookup key; only the validator's hash is
//! stored. Rotation is guarded by the old hash so two requests replaying
//! the same stale cookie cannot both succeed.

use sqlx::sqlite::SqlitePool;

/// A stored remember-me token.
#[derive(Debug, Clone)]
pub struct RememberToken {
    pub id: i64,
    pub selector: String,
    pub validator_hash: String,
    pub user_id: i64,
    pub expires_at: i64,
}

#[derive(sqlx::FromRow)]
struct RememberTokenRow {
    id: i64,
    selector: String,
    validator_hash: String,
    user_id: i64,
    expires_at: i64,
}

impl From<RememberTokenRow> for RememberToken {
    fn from(row: RememberTokenRow) -> Self {
        Self {
            id: row.id,
            selector: row.selector,
            validator_hash: row.validator_hash,
            user_id: row.user_id,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct RememberTokenStore {
    pool: SqlitePool,
}

impl RememberTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new token. Returns the row ID.
    pub async fn create(
        &self,
        selector: &str,
        validator_hash: &str,
        user_id: i64,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO remember_tokens (selector, validator_hash, user_id, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(selector)
        .bind(validator_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Look up a token by its public selector.
    pub async fn get_by_selector(
        &self,
        selector: &str,
    ) -> Result<Option<RememberToken>, sqlx::Error> {
        let row: Option<RememberTokenRow> = sqlx::query_as(
            "SELECT id, selector, validator_hash, user_id, expires_at
             FROM remember_tokens WHERE selector = ?",
        )
        .bind(selector)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RememberToken::from))
    }

    /// Rotate the validator, keeping the selector. The update only applies
    /// while the stored hash still equals `old_hash`; a false return means
    /// a concurrent request rotated first and this token is dead.
    pub async fn rotate(
        &self,
        selector: &str,
        old_hash: &str,
        new_hash: &str,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE remember_tokens SET validator_hash = ?, expires_at = ?
             WHERE selector = ? AND validator_hash = ?",
        )
        .bind(new_hash)
        .bind(expires_at)
        .bind(selector)
        .bind(old_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all tokens for a user (logout).
    pub async fn delete_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM remember_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all expired tokens.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM remember_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
