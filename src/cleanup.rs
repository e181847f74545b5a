//! Scheduled cleanup of expired refresh tokens.

use crate::db::RefreshTokenStore;
use crate::jwt::now_millis;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of records removed.
pub async fn run_cleanup<S: RefreshTokenStore>(store: &S) -> u64 {
    let now = match now_millis() {
        Ok(now) => now,
        Err(e) => {
            error!("Failed to read clock for cleanup: {}", e);
            return 0;
        }
    };

    match store.delete_expired(now).await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired refresh tokens", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to clean up expired refresh tokens: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler<S>(store: S) -> tokio::task::JoinHandle<()>
where
    S: RefreshTokenStore + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&store).await;
        }
    })
}
