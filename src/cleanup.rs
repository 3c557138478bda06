//! Scheduled cleanup tasks for expired data.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::clock::Clock;
use crate::db::Database;

/// Attempt counters whose window started longer ago than this are swept.
const STALE_ATTEMPT_HORIZON_SECS: i64 = 24 * 60 * 60;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, clock: &dyn Clock) {
    let now = clock.now();

    // Expired one-time codes and magic-link tokens
    match db.identities().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired identities", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired identities: {}", e),
    }

    // Expired remember-me tokens
    match db.remember_tokens().delete_expired(now).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired remember tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up remember tokens: {}", e),
    }

    // Long-stale attempt counters
    match db.attempts().delete_stale(now - STALE_ATTEMPT_HORIZON_SECS).await {
        Ok(count) if count > 0 => info!("Cleaned up {} stale attempt counters", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up attempt counters: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database, clock: Arc<dyn Clock>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, clock.as_ref()).await;
        }
    })
}
