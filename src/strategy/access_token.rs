//! Bearer access tokens.
//!
//! Stateless: every request re-validates the presented token. Storage
//! holds only the SHA-256 hash; the raw value is returned exactly once at
//! issuance and can never be retrieved again. A token unused for longer
//! than the configured lifetime is rejected as stale even though its hash
//! still matches.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Authenticator, Credentials, ban_reason, record_attempt, throttle_gate};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::{Database, Identity, IdentityKind, NewIdentity, User};
use crate::error::AuthError;
use crate::outcome::{Outcome, Reason};
use crate::secrets;
use crate::throttle::Throttle;

const TOKEN_BYTES: usize = 32;

/// Scope set attached to a validated token. `*` grants every scope.
#[derive(Debug, Clone)]
pub struct TokenHandle {
    pub identity_id: i64,
    scopes: Vec<String>,
}

impl TokenHandle {
    fn from_identity(identity: &Identity) -> Self {
        let scopes = identity
            .extra
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default();
        Self {
            identity_id: identity.id,
            scopes,
        }
    }

    /// Whether the token grants a scope.
    pub fn can(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == "*" || s == scope)
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Issuance and revocation, independent of request handling.
#[derive(Clone)]
pub struct AccessTokens {
    db: Database,
    clock: Arc<dyn Clock>,
}

/// The raw token leaves the engine exactly once, inside this value.
#[derive(Debug)]
pub struct IssuedToken {
    pub raw: String,
    pub identity_id: i64,
}

impl AccessTokens {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Mint a token for a user with the given scopes.
    pub async fn issue(&self, user_id: i64, scopes: &[&str]) -> Result<IssuedToken, AuthError> {
        let raw = secrets::random_token(TOKEN_BYTES);
        let extra = serde_json::to_string(scopes)
            .map_err(|e| AuthError::Db(sqlx::Error::Encode(Box::new(e))))?;

        let identity_id = self
            .db
            .identities()
            .create(
                user_id,
                &IdentityKind::AccessToken,
                NewIdentity {
                    secret: secrets::hash_token(&raw),
                    extra: Some(extra),
                    last_used_at: Some(self.clock.now()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(IssuedToken { raw, identity_id })
    }

    /// Revoke a single token.
    pub async fn revoke(&self, identity_id: i64) -> Result<bool, AuthError> {
        Ok(self.db.identities().delete(identity_id).await?)
    }

    /// Revoke every token a user holds.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, AuthError> {
        Ok(self
            .db
            .identities()
            .delete_by_kind(user_id, &IdentityKind::AccessToken)
            .await?)
    }
}

pub struct AccessTokenAuthenticator {
    db: Database,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
    throttle: Throttle,
    /// Token presented by the request, used when credentials carry none.
    raw: Option<String>,
    user: Option<User>,
    token: Option<TokenHandle>,
}

impl AccessTokenAuthenticator {
    pub(crate) fn new(
        db: Database,
        config: Arc<AuthConfig>,
        clock: Arc<dyn Clock>,
        raw: Option<String>,
    ) -> Self {
        let throttle = Throttle::new(db.clone(), &config, clock.clone());
        Self {
            db,
            config,
            clock,
            throttle,
            raw,
            user: None,
            token: None,
        }
    }

    /// The validated token's scope handle, after a successful check.
    pub fn token(&self) -> Option<&TokenHandle> {
        self.token.as_ref()
    }
}

#[async_trait]
impl Authenticator for AccessTokenAuthenticator {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn check(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        let raw = creds.token.as_deref().or(self.raw.as_deref());
        let Some(raw) = raw else {
            return Ok(Outcome::fail(Reason::NoToken));
        };

        let hash = secrets::hash_token(raw);
        let Some(identity) = self
            .db
            .identities()
            .find_by_secret(&IdentityKind::AccessToken, &hash)
            .await?
        else {
            debug!("access token not found");
            return Ok(Outcome::fail(Reason::BadToken));
        };

        let now = self.clock.now();
        if let Some(last_used) = identity.last_used_at {
            if now - last_used > self.config.token_unused_lifetime {
                return Ok(Outcome::fail(Reason::OldToken));
            }
        }

        let Some(user) = self.db.users().get_by_id(identity.user_id).await? else {
            return Ok(Outcome::fail(Reason::UnknownUser));
        };

        self.db.identities().touch_last_used(identity.id, now).await?;
        self.token = Some(TokenHandle::from_identity(&identity));
        Ok(Outcome::ok(user))
    }

    async fn attempt(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        self.user = None;
        self.token = None;
        if let Some(blocked) = throttle_gate(&self.throttle, creds).await? {
            return Ok(blocked);
        }

        let mut outcome = self.check(creds).await?;
        if let Some(user) = outcome.user() {
            if let Some(reason) = ban_reason(user) {
                self.logout().await?;
                outcome = Outcome::fail(reason);
            } else {
                self.user = Some(user.clone());
            }
        }

        record_attempt(&self.throttle, self.config.record_attempts, creds, &outcome).await?;
        Ok(outcome)
    }

    async fn logged_in(&mut self) -> Result<bool, AuthError> {
        // Stateless: re-derive from the request token every call.
        let creds = Credentials::default();
        Ok(self.attempt(&creds).await?.success())
    }

    async fn logout(&mut self) -> Result<(), AuthError> {
        // Nothing persisted per request; dropping the in-process user is all.
        self.user = None;
        self.token = None;
        Ok(())
    }

    fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}
