//! Signed-token authentication.
//!
//! Stateless like the access-token strategy, but nothing is stored per
//! token: the codec verifies the signature and claims, and the subject is
//! resolved to a user by UUID. Codec rejections of any kind (signature,
//! expiry, malformed) normalize to a "bad token" outcome.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Authenticator, Credentials, ban_reason, record_attempt, throttle_gate};
use crate::config::AuthConfig;
use crate::db::{Database, User};
use crate::error::AuthError;
use crate::jwt::JwtCodec;
use crate::outcome::{Outcome, Reason};
use crate::throttle::Throttle;

pub struct JwtAuthenticator {
    db: Database,
    config: Arc<AuthConfig>,
    codec: Arc<dyn JwtCodec>,
    throttle: Throttle,
    raw: Option<String>,
    user: Option<User>,
}

impl JwtAuthenticator {
    pub(crate) fn new(
        db: Database,
        config: Arc<AuthConfig>,
        codec: Arc<dyn JwtCodec>,
        throttle: Throttle,
        raw: Option<String>,
    ) -> Self {
        Self {
            db,
            config,
            codec,
            throttle,
            raw,
            user: None,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn check(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        let raw = creds.token.as_deref().or(self.raw.as_deref());
        let Some(raw) = raw else {
            return Ok(Outcome::fail(Reason::NoToken));
        };

        let claims = match self.codec.decode(raw) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("jwt rejected: {}", e);
                return Ok(Outcome::fail(Reason::BadToken));
            }
        };

        if claims.sub.is_empty() {
            return Ok(Outcome::fail(Reason::NoSubject));
        }

        let Some(user) = self.db.users().get_by_uuid(&claims.sub).await? else {
            return Ok(Outcome::fail(Reason::UnknownUser));
        };

        Ok(Outcome::ok(user))
    }

    async fn attempt(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        self.user = None;
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
        let creds = Credentials::default();
        Ok(self.attempt(&creds).await?.success())
    }

    async fn logout(&mut self) -> Result<(), AuthError> {
        self.user = None;
        Ok(())
    }

    fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock, SystemClock};
    use crate::jwt::{Claims, Hs256Codec};

    async fn setup() -> (Database, Arc<AuthConfig>, Arc<Hs256Codec>, String) {
        let db = Database::open(":memory:").await.unwrap();
        let config = Arc::new(AuthConfig::new(b"jwt-test-secret".to_vec()));
        let codec = Arc::new(Hs256Codec::new(&config.jwt_secret));
        db.users().create("uuid-1", "alice", true).await.unwrap();
        (db, config, codec, "uuid-1".to_string())
    }

    fn authenticator(
        db: &Database,
        config: &Arc<AuthConfig>,
        codec: &Arc<Hs256Codec>,
        raw: Option<String>,
    ) -> JwtAuthenticator {
        let throttle = Throttle::new(db.clone(), config, FixedClock::at(1_000));
        JwtAuthenticator::new(db.clone(), config.clone(), codec.clone(), throttle, raw)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let (db, config, codec, uuid) = setup().await;
        let token = codec.issue(&uuid, SystemClock.now(), 3600).unwrap();

        let mut auth = authenticator(&db, &config, &codec, Some(token));
        let outcome = auth.attempt(&Credentials::default()).await.unwrap();
        assert!(outcome.success());
        assert_eq!(auth.current_user().unwrap().username, "alice");
        assert!(auth.logged_in().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (db, config, codec, _uuid) = setup().await;
        let mut auth = authenticator(&db, &config, &codec, None);
        let outcome = auth.check(&Credentials::default()).await.unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::NoToken));
    }

    #[tokio::test]
    async fn test_bad_signature_normalizes_to_bad_token() {
        let (db, config, codec, uuid) = setup().await;
        let other = Hs256Codec::new(b"different-secret");
        let token = other.issue(&uuid, SystemClock.now(), 3600).unwrap();

        let mut auth = authenticator(&db, &config, &codec, Some(token));
        let outcome = auth.check(&Credentials::default()).await.unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::BadToken));
    }

    #[tokio::test]
    async fn test_blank_subject_rejected() {
        let (db, config, codec, _uuid) = setup().await;
        let now = SystemClock.now();
        let token = codec
            .encode(&Claims {
                sub: String::new(),
                iat: now as u64,
                exp: (now + 60) as u64,
            })
            .unwrap();

        let mut auth = authenticator(&db, &config, &codec, Some(token));
        let outcome = auth.check(&Credentials::default()).await.unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::NoSubject));
    }

    #[tokio::test]
    async fn test_unresolvable_subject_rejected() {
        let (db, config, codec, _uuid) = setup().await;
        let token = codec.issue("uuid-ghost", SystemClock.now(), 3600).unwrap();

        let mut auth = authenticator(&db, &config, &codec, Some(token));
        let outcome = auth.check(&Credentials::default()).await.unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::UnknownUser));
    }

    #[tokio::test]
    async fn test_banned_user_fails_and_is_logged_out() {
        let (db, config, codec, uuid) = setup().await;
        let user = db.users().get_by_uuid(&uuid).await.unwrap().unwrap();
        db.users().ban(user.id, None).await.unwrap();
        let token = codec.issue(&uuid, SystemClock.now(), 3600).unwrap();

        let mut auth = authenticator(&db, &config, &codec, Some(token));
        let outcome = auth.attempt(&Credentials::default()).await.unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::Banned(None)));
        assert!(auth.current_user().is_none());
    }
}
