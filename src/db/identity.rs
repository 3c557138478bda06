//! Credential records: one row per stored secret of a user.
//!
//! Passwords and API tokens store a one-way hash in `secret`; one-time
//! codes and magic-link tokens store the verifiable token itself with a
//! separate expiry. Single-use kinds are deleted on consumption.

use sqlx::sqlite::SqlitePool;
use std::fmt;

/// The closed set of credential types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    EmailPassword,
    AccessToken,
    MagicLink,
    EmailTwoFactor,
    EmailActivate,
    Username,
    Jwt,
    /// Third-party identity, e.g. `oauth_github`. Structurally identical to
    /// the other kinds; the provider exchange itself happens elsewhere.
    OAuth(String),
}

impl IdentityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_password" => Some(Self::EmailPassword),
            "access_token" => Some(Self::AccessToken),
            "magic_link" => Some(Self::MagicLink),
            "email_2fa" => Some(Self::EmailTwoFactor),
            "email_activate" => Some(Self::EmailActivate),
            "username" => Some(Self::Username),
            "jwt" => Some(Self::Jwt),
            other => other
                .strip_prefix("oauth_")
                .filter(|p| !p.is_empty())
                .map(|p| Self::OAuth(p.to_string())),
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmailPassword => write!(f, "email_password"),
            Self::AccessToken => write!(f, "access_token"),
            Self::MagicLink => write!(f, "magic_link"),
            Self::EmailTwoFactor => write!(f, "email_2fa"),
            Self::EmailActivate => write!(f, "email_activate"),
            Self::Username => write!(f, "username"),
            Self::Jwt => write!(f, "jwt"),
            Self::OAuth(provider) => write!(f, "oauth_{}", provider),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub user_id: i64,
    pub kind: IdentityKind,
    pub secret: String,
    pub secret2: Option<String>,
    pub extra: Option<String>,
    pub expires_at: Option<i64>,
    pub force_reset: bool,
    pub last_used_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    user_id: i64,
    kind: String,
    secret: String,
    secret2: Option<String>,
    extra: Option<String>,
    expires_at: Option<i64>,
    force_reset: i32,
    last_used_at: Option<i64>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = sqlx::Error;

    fn try_from(row: IdentityRow) -> Result<Self, sqlx::Error> {
        let kind = IdentityKind::parse(&row.kind)
            .ok_or_else(|| sqlx::Error::Decode(format!("bad identity kind: {}", row.kind).into()))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind,
            secret: row.secret,
            secret2: row.secret2,
            extra: row.extra,
            expires_at: row.expires_at,
            force_reset: row.force_reset != 0,
            last_used_at: row.last_used_at,
        })
    }
}

/// Fields for a new identity row.
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub secret: String,
    pub secret2: Option<String>,
    pub extra: Option<String>,
    pub expires_at: Option<i64>,
    pub last_used_at: Option<i64>,
}

const IDENTITY_COLUMNS: &str =
    "id, user_id, kind, secret, secret2, extra, expires_at, force_reset, last_used_at";

#[derive(Clone)]
pub struct IdentityStore {
    pool: SqlitePool,
}

impl IdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an identity for a user. Returns the row ID.
    pub async fn create(
        &self,
        user_id: i64,
        kind: &IdentityKind,
        new: NewIdentity,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO identities (user_id, kind, secret, secret2, extra, expires_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(kind.to_string())
        .bind(&new.secret)
        .bind(&new.secret2)
        .bind(&new.extra)
        .bind(new.expires_at)
        .bind(new.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get the most recent identity of a kind for a user.
    pub async fn get_by_kind(
        &self,
        user_id: i64,
        kind: &IdentityKind,
    ) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities
             WHERE user_id = ? AND kind = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    /// Get the first identity matching any of the given kinds, checked in
    /// the order given. First match wins.
    pub async fn get_first_of_kinds(
        &self,
        user_id: i64,
        kinds: &[IdentityKind],
    ) -> Result<Option<Identity>, sqlx::Error> {
        for kind in kinds {
            if let Some(identity) = self.get_by_kind(user_id, kind).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    /// Look up an identity by its stored secret (hash lookup for tokens).
    pub async fn find_by_secret(
        &self,
        kind: &IdentityKind,
        secret: &str,
    ) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE kind = ? AND secret = ?"
        ))
        .bind(kind.to_string())
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    /// Consume a single-use identity: delete it only if the secret still
    /// matches. Returns false when another request already consumed it, so
    /// a replayed code cannot succeed twice.
    pub async fn consume(&self, id: i64, secret: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE id = ? AND secret = ?")
            .bind(id)
            .bind(secret)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all identities of a kind for a user.
    pub async fn delete_by_kind(
        &self,
        user_id: i64,
        kind: &IdentityKind,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE user_id = ? AND kind = ?")
            .bind(user_id)
            .bind(kind.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete an identity by row ID (token revocation).
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update the last-used timestamp. The write is skipped when the stored
    /// value already equals `now`, so repeated hits within the same second
    /// cost one read and no write.
    pub async fn touch_last_used(&self, id: i64, now: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE identities SET last_used_at = ?
             WHERE id = ? AND (last_used_at IS NULL OR last_used_at <> ?)",
        )
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the secret (password change) and clear the force-reset flag.
    pub async fn set_secret(&self, id: i64, secret: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE identities SET secret = ?, force_reset = 0 WHERE id = ?")
            .bind(secret)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag an identity so the next check demands a reset.
    pub async fn set_force_reset(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE identities SET force_reset = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired identities (lapsed codes and magic links).
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM identities WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn user(db: &Database) -> i64 {
        db.users().create("uuid-1", "alice", true).await.unwrap()
    }

    #[test]
    fn test_kind_roundtrip() {
        for s in [
            "email_password",
            "access_token",
            "magic_link",
            "email_2fa",
            "email_activate",
            "username",
            "jwt",
            "oauth_github",
        ] {
            let kind = IdentityKind::parse(s).unwrap();
            assert_eq!(kind.to_string(), s);
        }
        assert!(IdentityKind::parse("passkey").is_none());
        assert!(IdentityKind::parse("oauth_").is_none());
    }

    #[tokio::test]
    async fn test_create_and_get_by_kind() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        db.identities()
            .create(
                uid,
                &IdentityKind::EmailPassword,
                NewIdentity {
                    secret: "hash".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let identity = db
            .identities()
            .get_by_kind(uid, &IdentityKind::EmailPassword)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.secret, "hash");
        assert!(!identity.force_reset);

        assert!(
            db.identities()
                .get_by_kind(uid, &IdentityKind::AccessToken)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_first_of_kinds_respects_order() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        db.identities()
            .create(
                uid,
                &IdentityKind::EmailTwoFactor,
                NewIdentity {
                    secret: "222222".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        db.identities()
            .create(
                uid,
                &IdentityKind::EmailActivate,
                NewIdentity {
                    secret: "111111".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = db
            .identities()
            .get_first_of_kinds(
                uid,
                &[IdentityKind::EmailActivate, IdentityKind::EmailTwoFactor],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.kind, IdentityKind::EmailActivate);
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        let id = db
            .identities()
            .create(
                uid,
                &IdentityKind::EmailActivate,
                NewIdentity {
                    secret: "123456".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(db.identities().consume(id, "123456").await.unwrap());
        // replay fails: the row is gone
        assert!(!db.identities().consume(id, "123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_requires_matching_secret() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        let id = db
            .identities()
            .create(
                uid,
                &IdentityKind::EmailActivate,
                NewIdentity {
                    secret: "123456".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!db.identities().consume(id, "654321").await.unwrap());
        // still present for a retry
        assert!(
            db.identities()
                .get_by_kind(uid, &IdentityKind::EmailActivate)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_oauth_identity_attaches_like_any_other() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;
        let kind = IdentityKind::OAuth("github".to_string());

        // secret holds the provider's subject id, extra the profile payload
        db.identities()
            .create(
                uid,
                &kind,
                NewIdentity {
                    secret: "gh-913".into(),
                    extra: Some("{\"login\":\"alice\"}".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let identity = db
            .identities()
            .find_by_secret(&kind, "gh-913")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.user_id, uid);
        assert_eq!(identity.kind, kind);
    }

    #[tokio::test]
    async fn test_touch_last_used() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        let id = db
            .identities()
            .create(
                uid,
                &IdentityKind::AccessToken,
                NewIdentity {
                    secret: "tokenhash".into(),
                    last_used_at: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        db.identities().touch_last_used(id, 200).await.unwrap();
        let identity = db
            .identities()
            .find_by_secret(&IdentityKind::AccessToken, "tokenhash")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.last_used_at, Some(200));
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_unexpiring_rows() {
        let db = Database::open(":memory:").await.unwrap();
        let uid = user(&db).await;

        db.identities()
            .create(
                uid,
                &IdentityKind::MagicLink,
                NewIdentity {
                    secret: "tok".into(),
                    expires_at: Some(500),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        db.identities()
            .create(
                uid,
                &IdentityKind::EmailPassword,
                NewIdentity {
                    secret: "hash".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(db.identities().delete_expired(1_000).await.unwrap(), 1);
        assert!(
            db.identities()
                .get_by_kind(uid, &IdentityKind::EmailPassword)
                .await
                .unwrap()
                .is_some()
        );
    }
}
