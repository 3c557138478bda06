//! End-to-end session authentication flows.
//!
//! Tests cover:
//! - Registration entering the activation chain (PENDING, not LOGGED_IN)
//! - Posting the emailed code transitions to LOGGED_IN and consumes it
//! - A fresh request stays logged in without re-supplying the code
//! - Two-factor chain on interactive login
//! - Logout clearing all session state

mod common;

use common::{create_user, test_engine};
use gatehouse::db::IdentityKind;
use gatehouse::{AuthState, Authenticator, Credentials, Reason, Session};

fn creds(username: &str, password: &str) -> Credentials {
    Credentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        ip: Some("203.0.113.9".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_activate_login_scenario() {
    let ctx = test_engine(|c| {
        c.register_actions = vec![IdentityKind::EmailActivate];
    })
    .await;

    // register: the account exists but owes activation
    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth.register("alice", "correct-horse-battery", false).await.unwrap();
    assert!(outcome.success());
    assert_eq!(auth.state().await.unwrap(), AuthState::Pending);
    assert!(!auth.logged_in().await.unwrap());

    let user = outcome.user().unwrap().clone();
    assert!(!user.active);

    // the 6-digit code would be emailed; posting it completes the login
    let started = auth.take_started_action().expect("activation code issued");
    assert_eq!(started.kind, IdentityKind::EmailActivate);
    assert_eq!(started.token.len(), 6);

    assert!(auth.check_action(&started.token).await.unwrap());
    assert_eq!(auth.state().await.unwrap(), AuthState::LoggedIn);
    assert!(ctx.db.users().get_by_id(user.id).await.unwrap().unwrap().active);

    // the identity row is gone; replaying the code fails
    assert!(
        ctx.db
            .identities()
            .get_by_kind(user.id, &IdentityKind::EmailActivate)
            .await
            .unwrap()
            .is_none()
    );

    // a later request with the persisted session is logged in without a code
    let session = auth.into_session();
    let mut next = ctx.engine.session(session);
    assert!(next.logged_in().await.unwrap());
    assert_eq!(next.current_user().unwrap().username, "alice");
}

#[tokio::test]
async fn test_unactivated_user_relogin_is_intercepted() {
    let ctx = test_engine(|c| {
        c.register_actions = vec![IdentityKind::EmailActivate];
    })
    .await;

    let mut auth = ctx.engine.session(Session::new());
    auth.register("alice", "correct-horse-battery", false).await.unwrap();
    // user abandons the browser before activating

    // a later password login authenticates but lands in PENDING again
    let mut later = ctx.engine.session(Session::new());
    let outcome = later.attempt(&creds("alice", "correct-horse-battery")).await.unwrap();
    assert!(outcome.success());
    assert_eq!(later.state().await.unwrap(), AuthState::Pending);
    assert!(!later.logged_in().await.unwrap());
}

#[tokio::test]
async fn test_two_factor_chain_on_login() {
    let ctx = test_engine(|c| {
        c.login_actions = vec![IdentityKind::EmailTwoFactor];
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth.attempt(&creds("alice", "correct-horse-battery")).await.unwrap();
    assert!(outcome.success());
    assert!(auth.is_pending().await.unwrap());

    // wrong code (7 digits can never match a 6-digit code): still pending
    assert!(!auth.check_action("1234567").await.unwrap());
    assert!(auth.is_pending().await.unwrap());

    let code = auth.take_started_action().unwrap().token;
    assert!(auth.check_action(&code).await.unwrap());
    assert!(auth.logged_in().await.unwrap());

    // a second login issues an independent, fresh code
    let mut second = ctx.engine.session(Session::new());
    second.attempt(&creds("alice", "correct-horse-battery")).await.unwrap();
    let fresh = second.take_started_action().unwrap().token;
    assert!(second.check_action(&fresh).await.unwrap());
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_reasons() {
    let ctx = test_engine(|_| {}).await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth.attempt(&creds("alice", "correct-horse-batterz")).await.unwrap();
    assert_eq!(outcome.reason(), Some(&Reason::InvalidPassword));
    assert!(auth.is_anonymous().await.unwrap());

    let outcome = auth.attempt(&creds("mallory", "whatever-password")).await.unwrap();
    assert_eq!(outcome.reason(), Some(&Reason::UnknownUser));
}

#[tokio::test]
async fn test_logout_round_trip() {
    let ctx = test_engine(|_| {}).await;
    let user = create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    auth.attempt(&creds("alice", "correct-horse-battery")).await.unwrap();
    assert!(auth.logged_in().await.unwrap());
    let events = auth.take_events();
    assert_eq!(events, vec![gatehouse::AuthEvent::Login { user_id: user.id }]);

    auth.logout().await.unwrap();
    assert!(auth.is_anonymous().await.unwrap());
    assert!(auth.current_user().is_none());
    assert!(
        auth.take_events()
            .contains(&gatehouse::AuthEvent::Logout { user_id: user.id })
    );

    // the persisted session is anonymous on the next request too
    let session = auth.into_session();
    let mut next = ctx.engine.session(session);
    assert!(next.is_anonymous().await.unwrap());
}

#[tokio::test]
async fn test_registration_rejects_taken_username() {
    let ctx = test_engine(|c| c.register_actions.clear()).await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth.register("alice", "another-password-9", false).await.unwrap();
    assert_eq!(outcome.reason(), Some(&Reason::UsernameTaken));
}

#[tokio::test]
async fn test_registration_without_chain_logs_straight_in() {
    let ctx = test_engine(|c| c.register_actions.clear()).await;

    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth.register("alice", "correct-horse-battery", false).await.unwrap();
    assert!(outcome.success());
    assert!(outcome.user().unwrap().active);
    assert!(auth.logged_in().await.unwrap());
}
