//! Attempt throttling through the session strategy.
//!
//! Tests cover:
//! - Exactly `max` attempts admissible, the `max+1`th rejected with
//!   remaining seconds
//! - Fresh evaluation after the block lapses (counter deleted)
//! - Recording policies (none / failures-only / all)
//! - Key policies keeping callers independent

mod common;

use common::{create_user, test_engine};
use gatehouse::config::{KeyPolicy, RecordPolicy};
use gatehouse::{Authenticator, Credentials, Reason};
use gatehouse::Session;

fn creds_from(ip: &str, username: &str, password: &str) -> Credentials {
    Credentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        ip: Some(ip.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_boundary_and_retry_after() {
    let ctx = test_engine(|c| {
        c.throttle_max = 3;
        c.throttle_window = 600;
        c.throttle_block = 600;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    for _ in 0..3 {
        let outcome = auth
            .attempt(&creds_from("203.0.113.9", "alice", "wrong-password"))
            .await
            .unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::InvalidPassword));
    }

    ctx.clock.advance(10);
    let outcome = auth
        .attempt(&creds_from("203.0.113.9", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    match outcome.reason() {
        Some(Reason::TooManyRequests { retry_after }) => assert_eq!(*retry_after, 590),
        other => panic!("expected TooManyRequests, got {:?}", other),
    }
    assert!(!auth.logged_in().await.unwrap());
}

#[tokio::test]
async fn test_fresh_window_after_block() {
    let ctx = test_engine(|c| {
        c.throttle_max = 2;
        c.throttle_window = 300;
        c.throttle_block = 300;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    for _ in 0..2 {
        auth.attempt(&creds_from("203.0.113.9", "alice", "wrong-password"))
            .await
            .unwrap();
    }

    ctx.clock.advance(301);
    let outcome = auth
        .attempt(&creds_from("203.0.113.9", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(outcome.success());
    // the stale counter was deleted, not decremented
    assert!(ctx.db.attempts().get("ip:203.0.113.9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_different_ips_are_independent() {
    let ctx = test_engine(|c| {
        c.throttle_max = 2;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    for _ in 0..2 {
        auth.attempt(&creds_from("203.0.113.9", "alice", "wrong-password"))
            .await
            .unwrap();
    }
    let outcome = auth
        .attempt(&creds_from("203.0.113.9", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(matches!(
        outcome.reason(),
        Some(Reason::TooManyRequests { .. })
    ));

    // the neighbor is unaffected
    let mut other = ctx.engine.session(Session::new());
    let outcome = other
        .attempt(&creds_from("198.51.100.7", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(outcome.success());
}

#[tokio::test]
async fn test_username_key_policy() {
    let ctx = test_engine(|c| {
        c.throttle_key = KeyPolicy::Username;
        c.throttle_max = 2;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    // same victim username from rotating IPs still trips the throttle
    for ip in ["203.0.113.1", "203.0.113.2"] {
        auth.attempt(&creds_from(ip, "alice", "wrong-password"))
            .await
            .unwrap();
    }
    let outcome = auth
        .attempt(&creds_from("203.0.113.3", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(matches!(
        outcome.reason(),
        Some(Reason::TooManyRequests { .. })
    ));
}

#[tokio::test]
async fn test_record_policy_none_never_blocks() {
    let ctx = test_engine(|c| {
        c.record_attempts = RecordPolicy::None;
        c.throttle_max = 1;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    for _ in 0..5 {
        auth.attempt(&creds_from("203.0.113.9", "alice", "wrong-password"))
            .await
            .unwrap();
    }
    let outcome = auth
        .attempt(&creds_from("203.0.113.9", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(outcome.success());
}

#[tokio::test]
async fn test_record_policy_all_counts_successes() {
    let ctx = test_engine(|c| {
        c.record_attempts = RecordPolicy::All;
        c.throttle_max = 2;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    let outcome = auth
        .attempt(&creds_from("203.0.113.9", "alice", "correct-horse-battery"))
        .await
        .unwrap();
    assert!(outcome.success());
    auth.logout().await.unwrap();

    let record = ctx.db.attempts().get("ip:203.0.113.9").await.unwrap().unwrap();
    assert_eq!(record.count, 1);
}

#[tokio::test]
async fn test_attempts_without_key_datum_are_not_throttled() {
    let ctx = test_engine(|c| {
        c.throttle_max = 1;
    })
    .await;
    create_user(&ctx.db, "alice", "correct-horse-battery").await;

    let mut auth = ctx.engine.session(Session::new());
    for _ in 0..3 {
        // no IP on the credentials: nothing to key the counter on
        let outcome = auth
            .attempt(&Credentials {
                username: Some("alice".to_string()),
                password: Some("wrong-password".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.reason(), Some(&Reason::InvalidPassword));
    }
}
