//! Magic-link action: a random URL token mailed to the user. Clicking the
//! link plays the token through the pending-action verification, which
//! consumes it and completes the login.

use async_trait::async_trait;

use super::{AuthAction, StartedAction};
use crate::db::{Database, IdentityKind, NewIdentity};
use crate::error::AuthError;
use crate::secrets;

const LINK_TOKEN_BYTES: usize = 32;

pub struct MagicLinkAction {
    pub lifetime: i64,
}

#[async_trait]
impl AuthAction for MagicLinkAction {
    fn kind(&self) -> IdentityKind {
        IdentityKind::MagicLink
    }

    async fn start(
        &self,
        db: &Database,
        user_id: i64,
        now: i64,
    ) -> Result<StartedAction, AuthError> {
        let token = secrets::random_token(LINK_TOKEN_BYTES);
        let expires_at = now + self.lifetime;

        db.identities()
            .delete_by_kind(user_id, &IdentityKind::MagicLink)
            .await?;
        db.identities()
            .create(
                user_id,
                &IdentityKind::MagicLink,
                NewIdentity {
                    secret: token.clone(),
                    expires_at: Some(expires_at),
                    ..Default::default()
                },
            )
            .await?;

        Ok(StartedAction {
            kind: IdentityKind::MagicLink,
            token,
            expires_at,
        })
    }
}
