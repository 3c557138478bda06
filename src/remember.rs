//! Remember-me: long-lived logins through a rotating two-part token.
//!
//! The cookie carries `selector:validator`. The selector is a public
//! lookup key; the validator is compared via its hash, constant-time, and
//! rotated on every successful use so a captured cookie dies the moment
//! the legitimate client uses it. Every failure in this protocol degrades
//! to an anonymous session, never an error.

use std::sync::Arc;

use tracing::warn;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::{Database, RememberToken};
use crate::error::AuthError;
use crate::http::CookieChanges;
use crate::secrets;

const SELECTOR_BYTES: usize = 12;
const VALIDATOR_BYTES: usize = 20;

/// A validated remember-me token, pre-rotation.
#[derive(Debug, Clone)]
pub struct RememberedLogin {
    pub user_id: i64,
    selector: String,
    old_hash: String,
}

#[derive(Clone)]
pub struct RememberMe {
    db: Database,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
}

impl RememberMe {
    pub fn new(db: Database, config: Arc<AuthConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { db, config, clock }
    }

    /// Issue a fresh token for a user and set the cookie. The raw
    /// validator exists only in the cookie value; storage holds its hash.
    pub async fn remember(
        &self,
        user_id: i64,
        cookies: &mut CookieChanges,
    ) -> Result<(), AuthError> {
        let selector = secrets::random_token(SELECTOR_BYTES);
        let validator = secrets::random_token(VALIDATOR_BYTES);
        let expires_at = self.clock.now() + self.config.remember_lifetime;

        self.db
            .remember_tokens()
            .create(&selector, &secrets::hash_token(&validator), user_id, expires_at)
            .await?;

        cookies.set(
            &self.config.remember_cookie,
            format!("{}:{}", selector, validator),
            self.config.remember_lifetime,
        );
        Ok(())
    }

    /// Validate a raw cookie value without rotating. Absent/malformed/
    /// expired/mismatched all come back `None`.
    pub async fn check(&self, cookie: &str) -> Result<Option<RememberedLogin>, AuthError> {
        let Some((selector, validator)) = cookie.split_once(':') else {
            return Ok(None);
        };
        let Some(token) = self.db.remember_tokens().get_by_selector(selector).await? else {
            return Ok(None);
        };
        if token.expires_at <= self.clock.now() {
            return Ok(None);
        }
        if !secrets::verify_hashed(validator, &token.validator_hash) {
            warn!("remember-me validator mismatch for selector {}", selector);
            return Ok(None);
        }
        Ok(Some(RememberedLogin {
            user_id: token.user_id,
            selector: token.selector,
            old_hash: token.validator_hash,
        }))
    }

    /// Rotate a validated token: new validator, new expiry, same selector,
    /// and a re-issued cookie. The store update is guarded by the old hash;
    /// losing that race means a concurrent request already rotated, and
    /// this request must not proceed as logged in.
    pub async fn refresh(
        &self,
        login: &RememberedLogin,
        cookies: &mut CookieChanges,
    ) -> Result<bool, AuthError> {
        let validator = secrets::random_token(VALIDATOR_BYTES);
        let expires_at = self.clock.now() + self.config.remember_lifetime;

        let rotated = self
            .db
            .remember_tokens()
            .rotate(
                &login.selector,
                &login.old_hash,
                &secrets::hash_token(&validator),
                expires_at,
            )
            .await?;
        if !rotated {
            return Ok(false);
        }

        cookies.set(
            &self.config.remember_cookie,
            format!("{}:{}", login.selector, validator),
            self.config.remember_lifetime,
        );
        Ok(true)
    }

    /// Validate and rotate in one step. This is the path the session state
    /// machine uses; `None` means "treat as anonymous".
    pub async fn redeem(
        &self,
        cookie: &str,
        cookies: &mut CookieChanges,
    ) -> Result<Option<i64>, AuthError> {
        let Some(login) = self.check(cookie).await? else {
            return Ok(None);
        };
        if !self.refresh(&login, cookies).await? {
            return Ok(None);
        }
        Ok(Some(login.user_id))
    }

    /// Drop all of a user's tokens and the cookie (logout).
    pub async fn forget(
        &self,
        user_id: i64,
        cookies: &mut CookieChanges,
    ) -> Result<(), AuthError> {
        self.db.remember_tokens().delete_by_user(user_id).await?;
        cookies.remove(&self.config.remember_cookie);
        Ok(())
    }

    /// Delete expired rows. Ran opportunistically (sampled) on login and
    /// from the cleanup scheduler.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        Ok(self
            .db
            .remember_tokens()
            .delete_expired(self.clock.now())
            .await?)
    }

    /// Fetch the stored token behind a cookie value, for callers that need
    /// the record itself (tests, session listings).
    pub async fn stored_token(&self, cookie: &str) -> Result<Option<RememberToken>, AuthError> {
        let Some((selector, _)) = cookie.split_once(':') else {
            return Ok(None);
        };
        Ok(self.db.remember_tokens().get_by_selector(selector).await?)
    }
}
