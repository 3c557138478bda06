//! Request-session state.
//!
//! The engine never talks to a framework session store; it reads and
//! mutates this value object, and the caller persists it however it
//! likes (encrypted cookie, server-side store). The contract the engine
//! relies on: keyed user/pending values, id regeneration, CSRF rotation.

use serde::{Deserialize, Serialize};

use crate::db::IdentityKind;
use crate::secrets;

/// Session identifier length in random bytes.
const SESSION_ID_BYTES: usize = 16;
/// CSRF token length in random bytes.
const CSRF_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    csrf_token: String,
    user_id: Option<i64>,
    /// Kind of the auth action the user still owes, if any. While this is
    /// set the session authenticates as Pending, never LoggedIn.
    pending_action: Option<String>,
    /// Remember-me was requested but not yet issued (deferred until the
    /// pending action completes).
    remember_queued: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: secrets::random_token(SESSION_ID_BYTES),
            csrf_token: secrets::random_token(CSRF_TOKEN_BYTES),
            user_id: None,
            pending_action: None,
            remember_queued: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn set_user_id(&mut self, user_id: i64) {
        self.user_id = Some(user_id);
    }

    pub fn pending_action(&self) -> Option<IdentityKind> {
        self.pending_action.as_deref().and_then(IdentityKind::parse)
    }

    pub fn set_pending_action(&mut self, kind: &IdentityKind) {
        self.pending_action = Some(kind.to_string());
    }

    pub fn clear_pending_action(&mut self) {
        self.pending_action = None;
    }

    pub fn remember_queued(&self) -> bool {
        self.remember_queued
    }

    pub fn set_remember_queued(&mut self, queued: bool) {
        self.remember_queued = queued;
    }

    /// Drop all user-related state. The session id survives; callers that
    /// want a fresh id call [`regenerate_id`](Self::regenerate_id) too.
    pub fn clear_user(&mut self) {
        self.user_id = None;
        self.pending_action = None;
        self.remember_queued = false;
    }

    /// Swap the session id for a fresh random one (fixation defense).
    pub fn regenerate_id(&mut self) {
        self.id = secrets::random_token(SESSION_ID_BYTES);
    }

    /// Swap the CSRF token for a fresh random one.
    pub fn rotate_csrf(&mut self) {
        self.csrf_token = secrets::random_token(CSRF_TOKEN_BYTES);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
