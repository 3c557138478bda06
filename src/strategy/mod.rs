//! Authenticator strategies.
//!
//! Each strategy turns request credentials into an [`Outcome`]. They share
//! no base type; the common attempt orchestration (throttle gate, ban
//! gate, attempt recording) lives in the free helpers below and each
//! strategy composes them.

mod access_token;
mod jwt;
mod session;

pub use access_token::{AccessTokenAuthenticator, AccessTokens, IssuedToken, TokenHandle};
pub use jwt::JwtAuthenticator;
pub use session::{AuthEvent, AuthState, SessionAuthenticator};

use async_trait::async_trait;

use crate::config::RecordPolicy;
use crate::db::User;
use crate::error::AuthError;
use crate::outcome::{Outcome, Reason};
use crate::throttle::{Gate, Throttle};

/// Request credentials. Strategies read the fields they understand and
/// ignore the rest.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Raw access token or JWT from the request.
    pub token: Option<String>,
    /// Issue a remember-me token once the login fully completes.
    pub remember: bool,
    /// Client IP, for throttle keys.
    pub ip: Option<String>,
    /// Route + method, for throttle keys.
    pub route: Option<String>,
}

/// The strategy contract.
///
/// `check` validates without mutating login state; `attempt` runs `check`,
/// logs the user in on success and records the attempt per the configured
/// policy. Stateless strategies re-derive `logged_in` from the request
/// token on every call.
#[async_trait]
pub trait Authenticator: Send {
    fn name(&self) -> &'static str;

    async fn check(&mut self, creds: &Credentials) -> Result<Outcome, AuthError>;

    async fn attempt(&mut self, creds: &Credentials) -> Result<Outcome, AuthError>;

    async fn logged_in(&mut self) -> Result<bool, AuthError>;

    async fn logout(&mut self) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<&User>;
}

/// Consult the throttle before a check. `Some(outcome)` means the request
/// is blocked and must not proceed to credential validation.
pub(crate) async fn throttle_gate(
    throttle: &Throttle,
    creds: &Credentials,
) -> Result<Option<Outcome>, AuthError> {
    let Some(key) = throttle.key_for(creds) else {
        return Ok(None);
    };
    match throttle.check(&key).await? {
        Gate::Allowed => Ok(None),
        Gate::Blocked { retry_after } => {
            Ok(Some(Outcome::fail(Reason::TooManyRequests { retry_after })))
        }
    }
}

/// Record a finished attempt against the throttle counter per policy.
pub(crate) async fn record_attempt(
    throttle: &Throttle,
    policy: RecordPolicy,
    creds: &Credentials,
    outcome: &Outcome,
) -> Result<(), AuthError> {
    let record = match policy {
        RecordPolicy::None => false,
        RecordPolicy::FailuresOnly => !outcome.success(),
        RecordPolicy::All => true,
    };
    if !record {
        return Ok(());
    }
    if let Some(key) = throttle.key_for(creds) {
        throttle.hit(&key).await?;
    }
    Ok(())
}

/// Ban gate applied by every strategy between `check` and login. Banned
/// short-circuits hard; an inactive user passes and is intercepted by the
/// action chain instead.
pub(crate) fn ban_reason(user: &User) -> Option<Reason> {
    user.banned.then(|| Reason::Banned(user.ban_reason.clone()))
}
