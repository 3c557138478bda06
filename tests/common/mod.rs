#![allow(dead_code)]

use std::sync::Arc;

use gatehouse::clock::FixedClock;
use gatehouse::db::{Database, IdentityKind, NewIdentity, User};
use gatehouse::{AuthConfig, AuthEngine};

/// Epoch second every test clock starts at: 2100-01-01T00:00:00Z. Kept
/// ahead of the real clock because jsonwebtoken checks `exp` against
/// system time, not the injected clock.
pub const T0: i64 = 4_102_444_800;

pub struct TestContext {
    pub engine: AuthEngine,
    pub db: Database,
    pub clock: Arc<FixedClock>,
}

/// Build an engine over an in-memory database with a fixed clock.
pub async fn test_engine(mutate: impl FnOnce(&mut AuthConfig)) -> TestContext {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let clock = FixedClock::at(T0);
    let mut config = AuthConfig::new(b"test-jwt-secret".to_vec());
    config.secure_cookies = false;
    mutate(&mut config);
    let engine = AuthEngine::new(db.clone(), config).with_clock(clock.clone());
    TestContext { engine, db, clock }
}

/// Create an activated user with a password identity.
pub async fn create_user(db: &Database, username: &str, password: &str) -> User {
    let id = db
        .users()
        .create(&format!("uuid-{}", username), username, true)
        .await
        .expect("Failed to create user");
    db.identities()
        .create(
            id,
            &IdentityKind::EmailPassword,
            NewIdentity {
                secret: gatehouse::password::hash_password(password).expect("Failed to hash"),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to create password identity");
    db.users().get_by_id(id).await.unwrap().unwrap()
}
