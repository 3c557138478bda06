//! Pass/fail outcome values returned by every authenticate/check call.

use crate::db::User;

/// Machine-readable failure reasons. Callers map these onto a finite set of
/// localized messages; the engine never surfaces free-form text for expected
/// failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// No token was supplied with the request.
    NoToken,
    /// The supplied token does not match any stored credential.
    BadToken,
    /// The token exists but has not been used within the configured lifetime.
    OldToken,
    /// No user matches the supplied identifier.
    UnknownUser,
    /// The password does not match the stored hash.
    InvalidPassword,
    /// The password identity is flagged for a forced reset.
    ResetRequired,
    /// The account is banned. Carries the stored ban reason, if any.
    Banned(Option<String>),
    /// The username is already taken (registration).
    UsernameTaken,
    /// A decoded token carried no usable subject claim.
    NoSubject,
    /// The attempt throttle rejected the request. `retry_after` is the number
    /// of seconds until the block lapses, suitable for a Retry-After header.
    TooManyRequests { retry_after: i64 },
}

impl Reason {
    /// Stable identifier for logging and client-side message lookup.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NoToken => "no token",
            Reason::BadToken => "bad token",
            Reason::OldToken => "old token",
            Reason::UnknownUser => "unknown user",
            Reason::InvalidPassword => "invalid password",
            Reason::ResetRequired => "reset required",
            Reason::Banned(_) => "banned",
            Reason::UsernameTaken => "username taken",
            Reason::NoSubject => "no subject",
            Reason::TooManyRequests { .. } => "too many requests",
        }
    }

    /// True for reasons that mark the request as unauthorized for logging.
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Reason::BadToken
                | Reason::OldToken
                | Reason::InvalidPassword
                | Reason::Banned(_)
                | Reason::TooManyRequests { .. }
        )
    }
}

/// Immutable result of an authenticate/check call: the resolved user on
/// success, a [`Reason`] on failure.
#[derive(Debug, Clone)]
pub struct Outcome {
    user: Option<User>,
    reason: Option<Reason>,
}

impl Outcome {
    pub fn ok(user: User) -> Self {
        Self {
            user: Some(user),
            reason: None,
        }
    }

    pub fn fail(reason: Reason) -> Self {
        Self {
            user: None,
            reason: Some(reason),
        }
    }

    pub fn success(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn into_user(self) -> Option<User> {
        self.user
    }

    pub fn reason(&self) -> Option<&Reason> {
        self.reason.as_ref()
    }
}
