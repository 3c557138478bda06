//! Groups, permissions and their join rows.
//!
//! Join rows carry an optional `until_at` expiry. Filtering happens here,
//! in SQL, so resolver caches never observe a lapsed grant.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

#[derive(Clone)]
pub struct AclStore {
    pool: SqlitePool,
}

impl AclStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a group. Returns its ID.
    pub async fn create_group(&self, name: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO groups (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Create a permission. Returns its ID.
    pub async fn create_permission(&self, name: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO permissions (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn group_by_name(&self, name: &str) -> Result<Option<Group>, sqlx::Error> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM groups WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| Group { id, name }))
    }

    pub async fn permission_by_name(&self, name: &str) -> Result<Option<Permission>, sqlx::Error> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM permissions WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| Permission { id, name }))
    }

    /// Groups a user currently belongs to. Lapsed memberships are invisible.
    pub async fn groups_of_user(&self, user_id: i64, now: i64) -> Result<Vec<Group>, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT g.id, g.name FROM groups g
             JOIN group_user gu ON gu.group_id = g.id
             WHERE gu.user_id = ? AND (gu.until_at IS NULL OR gu.until_at > ?)
             ORDER BY g.name",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id, name)| Group { id, name }).collect())
    }

    /// Permission names granted directly to a user.
    pub async fn permissions_of_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT p.name FROM permissions p
             JOIN permission_user pu ON pu.permission_id = p.id
             WHERE pu.user_id = ? AND (pu.until_at IS NULL OR pu.until_at > ?)
             ORDER BY p.name",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Permission names granted to a group.
    pub async fn permissions_of_group(
        &self,
        group_id: i64,
        now: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT p.name FROM permissions p
             JOIN permission_group pg ON pg.permission_id = p.id
             WHERE pg.group_id = ? AND (pg.until_at IS NULL OR pg.until_at > ?)
             ORDER BY p.name",
        )
        .bind(group_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Add a user to a group, replacing any prior (possibly lapsed) row.
    pub async fn add_user_to_group(
        &self,
        user_id: i64,
        group_id: i64,
        until_at: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO group_user (group_id, user_id, until_at) VALUES (?, ?, ?)",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(until_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_user_from_group(
        &self,
        user_id: i64,
        group_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM group_user WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Grant a permission directly to a user.
    pub async fn grant_user_permission(
        &self,
        user_id: i64,
        permission_id: i64,
        until_at: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO permission_user (permission_id, user_id, until_at)
             VALUES (?, ?, ?)",
        )
        .bind(permission_id)
        .bind(user_id)
        .bind(until_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn revoke_user_permission(
        &self,
        user_id: i64,
        permission_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM permission_user WHERE permission_id = ? AND user_id = ?")
                .bind(permission_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Grant a permission to a group.
    pub async fn grant_group_permission(
        &self,
        group_id: i64,
        permission_id: i64,
        until_at: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO permission_group (permission_id, group_id, until_at)
             VALUES (?, ?, ?)",
        )
        .bind(permission_id)
        .bind(group_id)
        .bind(until_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
