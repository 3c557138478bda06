//! Brute-force throttling of login attempts.
//!
//! Counters are persisted per throttle key inside a sliding window.
//! Reaching the configured maximum blocks the key until
//! `window_start + block` lapses; lapsed rows are deleted, never
//! decremented, so a fresh window starts clean.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::config::{AuthConfig, KeyPolicy};
use crate::db::Database;
use crate::error::AuthError;
use crate::strategy::Credentials;

/// Result of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allowed,
    /// Blocked; `retry_after` seconds until the block lapses.
    Blocked { retry_after: i64 },
}

#[derive(Clone)]
pub struct Throttle {
    db: Database,
    clock: Arc<dyn Clock>,
    key_policy: KeyPolicy,
    max: i64,
    window: i64,
    block: i64,
}

impl Throttle {
    pub fn new(db: Database, config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            key_policy: config.throttle_key,
            max: config.throttle_max as i64,
            window: config.throttle_window,
            block: config.throttle_block,
        }
    }

    /// Build the counter key for a request per the configured policy.
    /// `None` when the identifying datum is missing; such requests are not
    /// throttled.
    pub fn key_for(&self, creds: &Credentials) -> Option<String> {
        match self.key_policy {
            KeyPolicy::Ip => creds.ip.as_deref().map(|ip| format!("ip:{}", ip)),
            KeyPolicy::Username => creds
                .username
                .as_deref()
                .map(|u| format!("user:{}", u.to_lowercase())),
            KeyPolicy::Route => creds.route.as_deref().map(|r| format!("route:{}", r)),
        }
    }

    /// Check whether attempts under this key are currently admissible.
    pub async fn check(&self, key: &str) -> Result<Gate, AuthError> {
        let Some(record) = self.db.attempts().get(key).await? else {
            return Ok(Gate::Allowed);
        };
        let now = self.clock.now();

        if record.count >= self.max {
            let blocked_until = record.window_start + self.block;
            if now < blocked_until {
                return Ok(Gate::Blocked {
                    retry_after: blocked_until - now,
                });
            }
            // block lapsed: fresh window
            self.db.attempts().delete(key).await?;
            return Ok(Gate::Allowed);
        }

        if now >= record.window_start + self.window {
            self.db.attempts().delete(key).await?;
        }
        Ok(Gate::Allowed)
    }

    /// Record one attempt against the key.
    pub async fn hit(&self, key: &str) -> Result<(), AuthError> {
        self.db
            .attempts()
            .hit(key, self.clock.now(), self.max, self.window, self.block)
            .await?;
        Ok(())
    }

    /// Drop counters whose window start is far in the past. Called from
    /// the cleanup sweeps.
    pub async fn purge_stale(&self) -> Result<u64, AuthError> {
        let horizon = self.window.max(self.block);
        let purged = self
            .db
            .attempts()
            .delete_stale(self.clock.now() - horizon)
            .await?;
        if purged > 0 {
            info!("purged {} stale attempt counters", purged);
        }
        Ok(purged)
    }
}
