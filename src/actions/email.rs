//! Email-code actions: account activation and two-factor confirmation.
//! Both store a 6-digit single-use code with a short expiry.

use async_trait::async_trait;

use super::{AuthAction, StartedAction};
use crate::db::{Database, IdentityKind, NewIdentity};
use crate::error::AuthError;
use crate::secrets;

const CODE_DIGITS: u32 = 6;

async fn start_code_action(
    db: &Database,
    user_id: i64,
    kind: IdentityKind,
    lifetime: i64,
    now: i64,
) -> Result<StartedAction, AuthError> {
    let code = secrets::numeric_code(CODE_DIGITS);
    let expires_at = now + lifetime;

    // A restarted action invalidates any earlier code.
    db.identities().delete_by_kind(user_id, &kind).await?;
    db.identities()
        .create(
            user_id,
            &kind,
            NewIdentity {
                secret: code.clone(),
                expires_at: Some(expires_at),
                ..Default::default()
            },
        )
        .await?;

    Ok(StartedAction {
        kind,
        token: code,
        expires_at,
    })
}

/// Emails a 6-digit activation code after registration.
pub struct EmailActivateAction {
    pub lifetime: i64,
}

#[async_trait]
impl AuthAction for EmailActivateAction {
    fn kind(&self) -> IdentityKind {
        IdentityKind::EmailActivate
    }

    async fn start(
        &self,
        db: &Database,
        user_id: i64,
        now: i64,
    ) -> Result<StartedAction, AuthError> {
        start_code_action(db, user_id, IdentityKind::EmailActivate, self.lifetime, now).await
    }
}

/// Emails a 6-digit confirmation code on every interactive login.
pub struct EmailTwoFactorAction {
    pub lifetime: i64,
}

#[async_trait]
impl AuthAction for EmailTwoFactorAction {
    fn kind(&self) -> IdentityKind {
        IdentityKind::EmailTwoFactor
    }

    async fn start(
        &self,
        db: &Database,
        user_id: i64,
        now: i64,
    ) -> Result<StartedAction, AuthError> {
        start_code_action(db, user_id, IdentityKind::EmailTwoFactor, self.lifetime, now).await
    }
}
