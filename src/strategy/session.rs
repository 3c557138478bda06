//! Session authentication: password login, the pending-action chain and
//! remember-me rescue.
//!
//! The authenticator is request-scoped. Its state machine is evaluated at
//! most once per instance:
//!
//! ```text
//! Unknown ──▶ Anonymous | Pending | LoggedIn
//! ```
//!
//! No session user: try the remember-me cookie, else anonymous. A session
//! user that no longer exists clears the session. A pending-action marker
//! wins over logged-in.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Authenticator, Credentials, ban_reason, record_attempt, throttle_gate};
use crate::actions::{StartedAction, action_for, action_kinds};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::{Database, IdentityKind, NewIdentity, User};
use crate::error::AuthError;
use crate::http::CookieChanges;
use crate::outcome::{Outcome, Reason};
use crate::password;
use crate::remember::RememberMe;
use crate::session::Session;
use crate::throttle::Throttle;

/// Authentication state of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Not evaluated yet.
    Unknown,
    Anonymous,
    /// A user is bound but still owes an auth action.
    Pending,
    LoggedIn,
}

/// Observer events fired by the state machine. Drained by the caller;
/// there is no event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Login { user_id: i64 },
    Logout { user_id: i64 },
}

/// The action-chain step being entered.
enum Step {
    Login,
    Register,
}

pub struct SessionAuthenticator {
    db: Database,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
    throttle: Throttle,
    remember: RememberMe,
    session: Session,
    remember_cookie: Option<String>,
    cookies: CookieChanges,
    state: AuthState,
    user: Option<User>,
    events: Vec<AuthEvent>,
    started: Option<StartedAction>,
}

impl SessionAuthenticator {
    pub(crate) fn new(
        db: Database,
        config: Arc<AuthConfig>,
        clock: Arc<dyn Clock>,
        session: Session,
    ) -> Self {
        let throttle = Throttle::new(db.clone(), &config, clock.clone());
        let remember = RememberMe::new(db.clone(), config.clone(), clock.clone());
        Self {
            db,
            config,
            clock,
            throttle,
            remember,
            session,
            remember_cookie: None,
            cookies: CookieChanges::new(),
            state: AuthState::Unknown,
            user: None,
            events: Vec::new(),
            started: None,
        }
    }

    /// Attach the incoming remember-me cookie value, if the request
    /// carried one.
    pub fn with_remember_cookie(mut self, cookie: Option<String>) -> Self {
        self.remember_cookie = cookie;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Hand the (possibly mutated) session back for persistence.
    pub fn into_session(self) -> Session {
        self.session
    }

    /// Outgoing cookie mutations accumulated this request.
    pub fn cookies(&self) -> &CookieChanges {
        &self.cookies
    }

    pub fn take_cookies(&mut self) -> CookieChanges {
        std::mem::take(&mut self.cookies)
    }

    /// Drain login/logout events fired since the last drain.
    pub fn take_events(&mut self) -> Vec<AuthEvent> {
        std::mem::take(&mut self.events)
    }

    /// The deliverable of the most recently started action (one-time code
    /// or link token), for the caller to mail out.
    pub fn started_action(&self) -> Option<&StartedAction> {
        self.started.as_ref()
    }

    pub fn take_started_action(&mut self) -> Option<StartedAction> {
        self.started.take()
    }

    /// Evaluate the state machine, once. Later calls return the memo.
    pub async fn state(&mut self) -> Result<AuthState, AuthError> {
        if self.state != AuthState::Unknown {
            return Ok(self.state);
        }
        self.state = self.evaluate().await?;
        Ok(self.state)
    }

    async fn evaluate(&mut self) -> Result<AuthState, AuthError> {
        if self.session.user_id().is_none() {
            let Some(cookie) = self.remember_cookie.clone() else {
                return Ok(AuthState::Anonymous);
            };
            // Remember-me is best-effort: every validation failure lands
            // on Anonymous, never an error.
            match self.remember.redeem(&cookie, &mut self.cookies).await? {
                Some(user_id) => {
                    self.session.set_user_id(user_id);
                    self.session.regenerate_id();
                }
                None => return Ok(AuthState::Anonymous),
            }
        }

        let user_id = self.session.user_id().expect("bound above");
        let Some(user) = self.db.users().get_by_id(user_id).await? else {
            // dangling session user
            self.session.clear_user();
            self.user = None;
            return Ok(AuthState::Anonymous);
        };
        self.user = Some(user);

        if self.session.pending_action().is_some() {
            return Ok(AuthState::Pending);
        }
        Ok(AuthState::LoggedIn)
    }

    pub async fn is_pending(&mut self) -> Result<bool, AuthError> {
        Ok(self.state().await? == AuthState::Pending)
    }

    pub async fn is_anonymous(&mut self) -> Result<bool, AuthError> {
        Ok(self.state().await? == AuthState::Anonymous)
    }

    /// Bind a user to the session.
    ///
    /// Interactive logins (`with_actions`) run the action chain: an owed
    /// action, or the first configured login action, parks the session in
    /// Pending. Non-interactive logins must owe nothing and fail fast
    /// otherwise, so callers that cannot run a verification step never
    /// half-log-in a user.
    pub async fn login(&mut self, user: &User, with_actions: bool) -> Result<(), AuthError> {
        self.guard_not_bound_to_other(user)?;
        if with_actions {
            return self.login_with_step(user, Step::Login).await;
        }

        if self.session.pending_action().is_some() || self.owed_action(user.id).await?.is_some() {
            return Err(AuthError::PendingActions);
        }
        self.complete_login(user).await
    }

    /// Register a new account: create the user and password identity, then
    /// enter the "register" action chain (activation by default).
    pub async fn register(
        &mut self,
        username: &str,
        plain_password: &str,
        remember: bool,
    ) -> Result<Outcome, AuthError> {
        if !self.db.users().is_username_available(username).await? {
            return Ok(Outcome::fail(Reason::UsernameTaken));
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        let active = !self
            .config
            .register_actions
            .contains(&IdentityKind::EmailActivate);
        let user_id = self.db.users().create(&uuid, username, active).await?;

        let hash = password::hash_password(plain_password)?;
        self.db
            .identities()
            .create(
                user_id,
                &IdentityKind::EmailPassword,
                NewIdentity {
                    secret: hash,
                    ..Default::default()
                },
            )
            .await?;

        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::Db(sqlx::Error::RowNotFound))?;

        self.guard_not_bound_to_other(&user)?;
        self.session.set_remember_queued(remember);
        self.login_with_step(&user, Step::Register).await?;
        Ok(Outcome::ok(user))
    }

    /// Does the user owe an action? For a not-yet-bound user (magic-link
    /// flow) pass `Some(user_id)`: a found action provisionally binds the
    /// user and parks the session in Pending without granting LoggedIn.
    /// For the session-bound user pass `None`: the session marker answers
    /// first, then the identity scan.
    pub async fn has_action(&mut self, user_id: Option<i64>) -> Result<bool, AuthError> {
        match user_id {
            Some(uid) => {
                let Some(kind) = self.owed_action(uid).await? else {
                    return Ok(false);
                };
                self.session.set_user_id(uid);
                self.session.set_pending_action(&kind);
                self.state = AuthState::Unknown;
                Ok(true)
            }
            None => {
                if self.session.pending_action().is_some() {
                    return Ok(true);
                }
                let Some(uid) = self.session.user_id() else {
                    return Ok(false);
                };
                let Some(kind) = self.owed_action(uid).await? else {
                    return Ok(false);
                };
                self.session.set_pending_action(&kind);
                self.state = AuthState::Unknown;
                Ok(true)
            }
        }
    }

    /// Verify the pending action's one-time code.
    ///
    /// The comparison is exact string equality on purpose: the secret is a
    /// random single-use code, not a password. A match consumes the
    /// identity (replays find nothing), clears the pending markers and
    /// completes the login. A mismatch leaves everything for a retry.
    pub async fn check_action(&mut self, code: &str) -> Result<bool, AuthError> {
        let Some(user_id) = self.session.user_id() else {
            return Ok(false);
        };
        let Some(kind) = self.session.pending_action() else {
            return Ok(false);
        };
        let Some(identity) = self.db.identities().get_by_kind(user_id, &kind).await? else {
            return Ok(false);
        };
        if let Some(expires_at) = identity.expires_at {
            if expires_at <= self.clock.now() {
                return Ok(false);
            }
        }
        if identity.secret != code {
            return Ok(false);
        }
        if !self.db.identities().consume(identity.id, code).await? {
            // lost to a concurrent consumption of the same code
            return Ok(false);
        }

        if kind == IdentityKind::EmailActivate {
            self.db.users().activate(user_id).await?;
        }

        self.session.clear_pending_action();
        let Some(user) = self.db.users().get_by_id(user_id).await? else {
            self.session.clear_user();
            return Ok(false);
        };
        self.complete_login(&user).await?;
        Ok(true)
    }

    /// Create the identity for a named action and mark it pending. The
    /// deliverable lands in [`started_action`](Self::started_action).
    pub async fn start_up_action(
        &mut self,
        user_id: i64,
        kind: &IdentityKind,
    ) -> Result<(), AuthError> {
        let action = action_for(kind, &self.config)
            .ok_or_else(|| AuthError::UnknownAction(kind.to_string()))?;
        let started = action.start(&self.db, user_id, self.clock.now()).await?;
        self.session.set_pending_action(kind);
        self.started = Some(started);
        Ok(())
    }

    /// Re-issue the code for the session's pending action (resend mail).
    pub async fn restart_pending_action(&mut self) -> Result<Option<&StartedAction>, AuthError> {
        let (Some(user_id), Some(kind)) = (self.session.user_id(), self.session.pending_action())
        else {
            return Ok(None);
        };
        self.start_up_action(user_id, &kind).await?;
        Ok(self.started.as_ref())
    }

    /// Replace the user's password and clear any force-reset flag.
    pub async fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
    ) -> Result<bool, AuthError> {
        let Some(identity) = self
            .db
            .identities()
            .get_by_kind(user_id, &IdentityKind::EmailPassword)
            .await?
        else {
            return Ok(false);
        };
        let hash = password::hash_password(new_password)?;
        Ok(self.db.identities().set_secret(identity.id, &hash).await?)
    }

    fn guard_not_bound_to_other(&self, user: &User) -> Result<(), AuthError> {
        match self.session.user_id() {
            Some(bound) if bound != user.id => Err(AuthError::SessionBound {
                bound,
                attempted: user.id,
            }),
            _ => Ok(()),
        }
    }

    async fn login_with_step(&mut self, user: &User, step: Step) -> Result<(), AuthError> {
        self.session.set_user_id(user.id);

        // last-used bookkeeping on the password identity
        if let Some(identity) = self
            .db
            .identities()
            .get_by_kind(user.id, &IdentityKind::EmailPassword)
            .await?
        {
            self.db
                .identities()
                .touch_last_used(identity.id, self.clock.now())
                .await?;
        }

        // an already-owed action (e.g. never-finished activation) wins
        if let Some(kind) = self.owed_action(user.id).await? {
            self.session.set_pending_action(&kind);
            self.user = Some(user.clone());
            self.state = AuthState::Pending;
            return Ok(());
        }

        // otherwise start the first configured action of this step
        let chain = match step {
            Step::Login => &self.config.login_actions,
            Step::Register => &self.config.register_actions,
        };
        if let Some(kind) = chain.first().cloned() {
            self.start_up_action(user.id, &kind).await?;
            self.user = Some(user.clone());
            self.state = AuthState::Pending;
            return Ok(());
        }

        self.complete_login(user).await
    }

    /// First action kind (in configured order) backed by a stored identity.
    async fn owed_action(&self, user_id: i64) -> Result<Option<IdentityKind>, AuthError> {
        let kinds = action_kinds(&self.config);
        let identity = self.db.identities().get_first_of_kinds(user_id, &kinds).await?;
        Ok(identity.map(|i| i.kind))
    }

    /// The physical login: session-id and CSRF rotation, deferred
    /// remember-me issuance, the sampled purge sweep, the login event.
    async fn complete_login(&mut self, user: &User) -> Result<(), AuthError> {
        self.session.set_user_id(user.id);
        self.session.clear_pending_action();
        self.session.regenerate_id();
        self.session.rotate_csrf();

        if self.session.remember_queued() {
            self.remember.remember(user.id, &mut self.cookies).await?;
            self.session.set_remember_queued(false);
        }
        if rand::random::<f64>() < self.config.remember_purge_probability {
            self.remember.purge_expired().await?;
        }

        self.user = Some(user.clone());
        self.state = AuthState::LoggedIn;
        self.events.push(AuthEvent::Login { user_id: user.id });
        info!("user {} logged in", user.id);
        Ok(())
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    fn name(&self) -> &'static str {
        "session"
    }

    /// Validate username/password without touching login state.
    async fn check(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        let Some(username) = creds.username.as_deref() else {
            return Ok(Outcome::fail(Reason::UnknownUser));
        };
        let Some(user) = self.db.users().get_by_username(username).await? else {
            return Ok(Outcome::fail(Reason::UnknownUser));
        };
        let Some(identity) = self
            .db
            .identities()
            .get_by_kind(user.id, &IdentityKind::EmailPassword)
            .await?
        else {
            return Ok(Outcome::fail(Reason::InvalidPassword));
        };
        let Some(plain) = creds.password.as_deref() else {
            return Ok(Outcome::fail(Reason::InvalidPassword));
        };
        if !password::verify_password(plain, &identity.secret)? {
            return Ok(Outcome::fail(Reason::InvalidPassword));
        }
        if identity.force_reset {
            return Ok(Outcome::fail(Reason::ResetRequired));
        }
        Ok(Outcome::ok(user))
    }

    async fn attempt(&mut self, creds: &Credentials) -> Result<Outcome, AuthError> {
        if let Some(blocked) = throttle_gate(&self.throttle, creds).await? {
            return Ok(blocked);
        }

        let mut outcome = self.check(creds).await?;
        if let Some(user) = outcome.user().cloned() {
            if let Some(reason) = ban_reason(&user) {
                self.logout().await?;
                outcome = Outcome::fail(reason);
            } else {
                self.session.set_remember_queued(creds.remember);
                self.login(&user, true).await?;
            }
        }

        record_attempt(&self.throttle, self.config.record_attempts, creds, &outcome).await?;
        Ok(outcome)
    }

    async fn logged_in(&mut self) -> Result<bool, AuthError> {
        Ok(self.state().await? == AuthState::LoggedIn)
    }

    /// Clear the session user, purge their remember tokens and drop the
    /// cookie. The session id and CSRF token are rotated so nothing of the
    /// authenticated session survives.
    async fn logout(&mut self) -> Result<(), AuthError> {
        if let Some(user_id) = self.session.user_id() {
            self.remember.forget(user_id, &mut self.cookies).await?;
            self.events.push(AuthEvent::Logout { user_id });
            info!("user {} logged out", user_id);
        }
        self.session.clear_user();
        self.session.regenerate_id();
        self.session.rotate_csrf();
        self.user = None;
        self.state = AuthState::Anonymous;
        Ok(())
    }

    fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}
