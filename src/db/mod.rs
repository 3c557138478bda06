mod acl;
mod attempt;
mod identity;
mod remember_token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use acl::{AclStore, Group, Permission};
pub use attempt::{AttemptRecord, AttemptStore};
pub use identity::{Identity, IdentityKind, IdentityStore, NewIdentity};
pub use remember_token::{RememberToken, RememberTokenStore};
pub use user::{User, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Users table
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    active INTEGER NOT NULL DEFAULT 0,
                    banned INTEGER NOT NULL DEFAULT 0,
                    ban_reason TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    deleted_at INTEGER
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_username ON users(username)",
                // Identities: one row per stored credential of a user.
                // No uniqueness on (user_id, kind); one-per-user rules are
                // enforced by the business logic, not the store.
                "CREATE TABLE identities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    secret TEXT NOT NULL,
                    secret2 TEXT,
                    extra TEXT,
                    expires_at INTEGER,
                    force_reset INTEGER NOT NULL DEFAULT 0,
                    last_used_at INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_identities_user_kind ON identities(user_id, kind)",
                "CREATE INDEX idx_identities_kind_secret ON identities(kind, secret)",
                // Remember-me tokens: public selector, hashed validator
                "CREATE TABLE remember_tokens (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    selector TEXT UNIQUE NOT NULL,
                    validator_hash TEXT NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_remember_tokens_user_id ON remember_tokens(user_id)",
                "CREATE INDEX idx_remember_tokens_expires_at ON remember_tokens(expires_at)",
                // RBAC: groups, permissions and join rows with optional expiry
                "CREATE TABLE groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL
                )",
                "CREATE TABLE permissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL
                )",
                "CREATE TABLE group_user (
                    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    until_at INTEGER,
                    PRIMARY KEY (group_id, user_id)
                )",
                "CREATE INDEX idx_group_user_user_id ON group_user(user_id)",
                "CREATE TABLE permission_user (
                    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    until_at INTEGER,
                    PRIMARY KEY (permission_id, user_id)
                )",
                "CREATE INDEX idx_permission_user_user_id ON permission_user(user_id)",
                "CREATE TABLE permission_group (
                    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
                    group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                    until_at INTEGER,
                    PRIMARY KEY (permission_id, group_id)
                )",
                "CREATE INDEX idx_permission_group_group_id ON permission_group(group_id)",
                // Attempt throttle counters
                "CREATE TABLE attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT UNIQUE NOT NULL,
                    count INTEGER NOT NULL DEFAULT 1,
                    window_start INTEGER NOT NULL
                )",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the identity store.
    pub fn identities(&self) -> IdentityStore {
        IdentityStore::new(self.pool.clone())
    }

    /// Get the remember-me token store.
    pub fn remember_tokens(&self) -> RememberTokenStore {
        RememberTokenStore::new(self.pool.clone())
    }

    /// Get the groups/permissions store.
    pub fn acl(&self) -> AclStore {
        AclStore::new(self.pool.clone())
    }

    /// Get the attempt counter store.
    pub fn attempts(&self) -> AttemptStore {
        AttemptStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
