//! Error types for the engine.
//!
//! Expected per-credential failures (bad password, missing token, throttle
//! rejections) are never errors; they are [`Outcome`](crate::outcome::Outcome)
//! values. `AuthError` covers caller misuse and infrastructure failures only.

/// Errors that interrupt control flow: misuse by the caller or a failing
/// persistence/crypto layer. Never raised for ordinary invalid credentials.
#[derive(Debug)]
pub enum AuthError {
    /// Persistence layer failure. The core does not retry.
    Db(sqlx::Error),
    /// Password hashing backend failure (not a wrong password).
    Hash(String),
    /// JWT encoding failure at issuance time.
    Jwt(crate::jwt::JwtError),
    /// Non-interactive login requested while the user still owes an auth action.
    PendingActions,
    /// Attempt to start a login for a session already bound to a different user.
    SessionBound { bound: i64, attempted: i64 },
    /// A group name that does not exist was passed to an authorization mutation.
    UnknownGroup(String),
    /// A permission name that does not exist was passed to an authorization mutation.
    UnknownPermission(String),
    /// No authenticator strategy registered under this name.
    UnknownStrategy(String),
    /// A configured action kind has no action implementation.
    UnknownAction(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Db(e) => write!(f, "database error: {}", e),
            AuthError::Hash(e) => write!(f, "password hashing error: {}", e),
            AuthError::Jwt(e) => write!(f, "jwt error: {}", e),
            AuthError::PendingActions => {
                write!(f, "non-interactive login refused: auth actions are pending")
            }
            AuthError::SessionBound { bound, attempted } => write!(
                f,
                "session already bound to user {}, refusing login for user {}",
                bound, attempted
            ),
            AuthError::UnknownGroup(name) => write!(f, "unknown group: {}", name),
            AuthError::UnknownPermission(name) => write!(f, "unknown permission: {}", name),
            AuthError::UnknownStrategy(name) => write!(f, "unknown authenticator: {}", name),
            AuthError::UnknownAction(kind) => write!(f, "no auth action for kind: {}", kind),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Db(e) => Some(e),
            AuthError::Jwt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::Db(e)
    }
}

impl From<crate::jwt::JwtError> for AuthError {
    fn from(e: crate::jwt::JwtError) -> Self {
        AuthError::Jwt(e)
    }
}
