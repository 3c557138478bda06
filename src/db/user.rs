use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// An account record. Credentials live in the identity store, never here.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub active: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    username: String,
    active: i32,
    banned: i32,
    ban_reason: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            username: row.username,
            active: row.active != 0,
            banned: row.banned != 0,
            ban_reason: row.ban_reason,
        }
    }
}

const USER_COLUMNS: &str = "id, uuid, username, active, banned, ban_reason";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. `active` is 0 until the activation step completes.
    /// Returns the user ID.
    pub async fn create(&self, uuid: &str, username: &str, active: bool) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (uuid, username, active) VALUES (?, ?, ?)")
            .bind(uuid)
            .bind(username)
            .bind(active as i32)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Mark a user active (after the activation action completes).
    pub async fn activate(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET active = 1 WHERE id = ? AND active = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ban a user with an optional reason shown on rejected logins.
    pub async fn ban(&self, id: i64, reason: Option<&str>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET banned = 1, ban_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lift a ban.
    pub async fn unban(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET banned = 0, ban_reason = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete a user. Lookups treat the row as absent afterwards.
    pub async fn soft_delete(&self, id: i64, now: i64) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ? AND deleted_at IS NULL"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE uuid = ? AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Check if a username is free.
    pub async fn is_username_available(&self, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 == 0)
    }
}
