//! Pluggable authentication and authorization engine.
//!
//! Three interchangeable authenticator strategies (session, access token,
//! JWT), a pending-action chain for activation/2FA/magic-link steps, a
//! rotating remember-me token, RBAC resolution with wildcard permissions
//! and persistent login-attempt throttling. HTTP routing, templates and
//! mail delivery live outside; the engine exposes pass/fail outcomes and
//! state queries.

pub mod actions;
pub mod authz;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod jwt;
pub mod outcome;
pub mod password;
pub mod remember;
pub mod secrets;
pub mod session;
pub mod strategy;
pub mod throttle;

use std::sync::Arc;

pub use authz::AccessControl;
pub use config::AuthConfig;
pub use db::Database;
pub use error::AuthError;
pub use outcome::{Outcome, Reason};
pub use session::Session;
pub use strategy::{
    AccessTokenAuthenticator, AccessTokens, AuthEvent, AuthState, Authenticator, Credentials,
    JwtAuthenticator, SessionAuthenticator,
};

use clock::{Clock, SystemClock};
use jwt::{Claims, Hs256Codec, JwtCodec};
use remember::RememberMe;
use throttle::Throttle;

/// The wired engine: database, configuration, clock and JWT codec.
/// Cheap to clone; per-request state lives in the authenticators it
/// hands out.
#[derive(Clone)]
pub struct AuthEngine {
    db: Database,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
    codec: Arc<dyn JwtCodec>,
}

impl AuthEngine {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        let codec = Arc::new(Hs256Codec::new(&config.jwt_secret));
        Self {
            db,
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            codec,
        }
    }

    /// Swap the time source (tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Swap the JWT codec (different algorithm or key handling).
    pub fn with_codec(mut self, codec: Arc<dyn JwtCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The session strategy, bound to the request's session state.
    pub fn session(&self, session: Session) -> SessionAuthenticator {
        SessionAuthenticator::new(
            self.db.clone(),
            self.config.clone(),
            self.clock.clone(),
            session,
        )
    }

    /// The access-token strategy, bound to the request's raw token.
    pub fn token(&self, raw: Option<String>) -> AccessTokenAuthenticator {
        AccessTokenAuthenticator::new(
            self.db.clone(),
            self.config.clone(),
            self.clock.clone(),
            raw,
        )
    }

    /// The JWT strategy, bound to the request's raw token.
    pub fn jwt(&self, raw: Option<String>) -> JwtAuthenticator {
        JwtAuthenticator::new(
            self.db.clone(),
            self.config.clone(),
            self.codec.clone(),
            self.throttle(),
            raw,
        )
    }

    /// Strategy selection by name, for route/filter configuration that
    /// names its authenticator. `session` consumes the session state;
    /// `token` and `jwt` consume the raw request token.
    pub fn authenticator(
        &self,
        name: &str,
        session: Session,
        raw_token: Option<String>,
    ) -> Result<Box<dyn Authenticator>, AuthError> {
        match name {
            "session" => Ok(Box::new(self.session(session))),
            "token" => Ok(Box::new(self.token(raw_token))),
            "jwt" => Ok(Box::new(self.jwt(raw_token))),
            other => Err(AuthError::UnknownStrategy(other.to_string())),
        }
    }

    /// Issue a JWT for a user through the configured codec.
    pub fn issue_jwt(&self, user_uuid: &str) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: user_uuid.to_string(),
            iat: now as u64,
            exp: (now + self.config.jwt_lifetime) as u64,
        };
        Ok(self.codec.encode(&claims)?)
    }

    /// The RBAC resolver for a user, caches scoped to the returned value.
    pub fn access(&self, user_id: i64) -> AccessControl {
        AccessControl::new(self.db.clone(), self.clock.clone(), user_id)
    }

    /// Access-token issuance and revocation.
    pub fn access_tokens(&self) -> AccessTokens {
        AccessTokens::new(self.db.clone(), self.clock.clone())
    }

    /// The remember-me service.
    pub fn remember(&self) -> RememberMe {
        RememberMe::new(self.db.clone(), self.config.clone(), self.clock.clone())
    }

    /// The attempt throttle.
    pub fn throttle(&self) -> Throttle {
        Throttle::new(self.db.clone(), &self.config, self.clock.clone())
    }

    /// Run cleanup once and start the periodic background sweep.
    pub async fn init_cleanup(&self) -> tokio::task::JoinHandle<()> {
        cleanup::run_cleanup(&self.db, self.clock.as_ref()).await;
        cleanup::spawn_cleanup_scheduler(self.db.clone(), self.clock.clone())
    }
}
