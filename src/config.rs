//! Engine configuration.
//!
//! One explicit struct threaded through constructors. Nothing in the
//! engine reads ambient state.

use crate::db::IdentityKind;

/// Which attempts get recorded against the throttle counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPolicy {
    /// Record nothing.
    None,
    /// Record failed attempts only.
    FailuresOnly,
    /// Record every attempt, success included.
    All,
}

/// What identifies a caller for throttling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Client IP address.
    Ip,
    /// The username the attempt was made for.
    Username,
    /// Route + method of the request.
    Route,
}

#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for the built-in HS256 JWT codec.
    pub jwt_secret: Vec<u8>,
    /// JWT lifetime in seconds.
    pub jwt_lifetime: i64,
    /// Query parameter checked for an access token when no header carries one.
    pub token_param: String,
    /// An access token unused for longer than this is rejected as "old token".
    pub token_unused_lifetime: i64,
    /// Cookie name for the remember-me token.
    pub remember_cookie: String,
    /// Remember-me token lifetime in seconds.
    pub remember_lifetime: i64,
    /// Probability of sweeping expired remember tokens on a completed login.
    pub remember_purge_probability: f64,
    /// Action chain started on interactive login (e.g. email 2FA).
    pub login_actions: Vec<IdentityKind>,
    /// Action chain started on registration (e.g. email activation).
    pub register_actions: Vec<IdentityKind>,
    /// One-time code lifetime in seconds.
    pub code_lifetime: i64,
    /// Magic-link token lifetime in seconds.
    pub magic_link_lifetime: i64,
    /// Attempt recording policy.
    pub record_attempts: RecordPolicy,
    /// Throttle key selection.
    pub throttle_key: KeyPolicy,
    /// Attempts allowed within the window before the throttle blocks.
    pub throttle_max: u32,
    /// Accumulation window in seconds.
    pub throttle_window: i64,
    /// Block duration in seconds once the maximum is reached.
    pub throttle_block: i64,
    /// Whether issued cookies carry the Secure flag.
    pub secure_cookies: bool,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_lifetime: 60 * 60,
            token_param: "access_token".to_string(),
            token_unused_lifetime: 365 * 24 * 60 * 60,
            remember_cookie: "gatehouse_remember".to_string(),
            remember_lifetime: 30 * 24 * 60 * 60,
            remember_purge_probability: 0.2,
            login_actions: Vec::new(),
            register_actions: vec![IdentityKind::EmailActivate],
            code_lifetime: 15 * 60,
            magic_link_lifetime: 60 * 60,
            record_attempts: RecordPolicy::FailuresOnly,
            throttle_key: KeyPolicy::Ip,
            throttle_max: 5,
            throttle_window: 15 * 60,
            throttle_block: 15 * 60,
            secure_cookies: true,
        }
    }
}
