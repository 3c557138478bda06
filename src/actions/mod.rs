//! Post-login/post-registration auth actions.
//!
//! An action is owed while an identity of its kind exists for the user.
//! Starting an action creates that identity (a one-time code or link
//! token); verifying it consumes the identity and completes the login.
//! Delivery (mail) is the caller's job: the started action hands back the
//! raw token once.

mod email;
mod magic_link;

pub use email::{EmailActivateAction, EmailTwoFactorAction};
pub use magic_link::MagicLinkAction;

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::db::{Database, IdentityKind};
use crate::error::AuthError;

/// The deliverable produced by starting an action. The token appears here
/// exactly once; only the identity row remains afterwards.
#[derive(Debug, Clone)]
pub struct StartedAction {
    pub kind: IdentityKind,
    pub token: String,
    pub expires_at: i64,
}

/// A pending-action step: creates the identity record backing the step.
/// Verification is uniform across actions (exact match against the stored
/// single-use secret) and lives in the session authenticator.
#[async_trait]
pub trait AuthAction: Send + Sync {
    fn kind(&self) -> IdentityKind;

    /// Create (or replace) this action's identity for the user and return
    /// the deliverable token.
    async fn start(
        &self,
        db: &Database,
        user_id: i64,
        now: i64,
    ) -> Result<StartedAction, AuthError>;
}

/// All configured action kinds in configured order (register chain first,
/// then login chain), deduplicated. This is the scan order for deciding
/// whether a user owes an action; first match wins.
pub fn action_kinds(config: &AuthConfig) -> Vec<IdentityKind> {
    let mut kinds: Vec<IdentityKind> = Vec::new();
    for kind in config
        .register_actions
        .iter()
        .chain(config.login_actions.iter())
    {
        if !kinds.contains(kind) && action_for(kind, config).is_some() {
            kinds.push(kind.clone());
        }
    }
    kinds
}

/// Resolve the action implementation for a configured kind. Kinds without
/// an action implementation (passwords, tokens) resolve to `None`.
pub fn action_for(kind: &IdentityKind, config: &AuthConfig) -> Option<Box<dyn AuthAction>> {
    match kind {
        IdentityKind::EmailActivate => Some(Box::new(EmailActivateAction {
            lifetime: config.code_lifetime,
        })),
        IdentityKind::EmailTwoFactor => Some(Box::new(EmailTwoFactorAction {
            lifetime: config.code_lifetime,
        })),
        IdentityKind::MagicLink => Some(Box::new(MagicLinkAction {
            lifetime: config.magic_link_lifetime,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kinds_order_and_dedup() {
        let mut config = AuthConfig::new(b"secret".to_vec());
        config.register_actions = vec![IdentityKind::EmailActivate];
        config.login_actions = vec![IdentityKind::EmailTwoFactor, IdentityKind::EmailActivate];

        assert_eq!(
            action_kinds(&config),
            vec![IdentityKind::EmailActivate, IdentityKind::EmailTwoFactor]
        );

        // non-action kinds in a chain are ignored
        config.login_actions = vec![IdentityKind::EmailPassword];
        config.register_actions.clear();
        assert!(action_kinds(&config).is_empty());
    }

    #[test]
    fn test_action_registry_covers_action_kinds() {
        let config = AuthConfig::new(b"secret".to_vec());
        assert!(action_for(&IdentityKind::EmailActivate, &config).is_some());
        assert!(action_for(&IdentityKind::EmailTwoFactor, &config).is_some());
        assert!(action_for(&IdentityKind::MagicLink, &config).is_some());
        assert!(action_for(&IdentityKind::EmailPassword, &config).is_none());
        assert!(action_for(&IdentityKind::AccessToken, &config).is_none());
    }
}
