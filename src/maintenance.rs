/// Periodic housekeeping of the token tables.

use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::{AuthService, CleanupReport};
use crate::error::AppError;

/// Delete stale refresh tokens and expired blacklist entries once.
pub async fn run_cleanup(auth: &AuthService) -> Result<CleanupReport, AppError> {
    auth.cleanup().await
}

/// Run the cleanup every `interval_secs` on the tokio runtime.
///
/// Returns `None` when the interval is zero, which disables the task.
pub fn spawn_cleanup_task(auth: AuthService, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("Periodic token cleanup disabled");
        return None;
    }

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = run_cleanup(&auth).await {
                tracing::error!(error = %e, "Periodic token cleanup failed");
            }
        }
    });

    Some(handle)
}
