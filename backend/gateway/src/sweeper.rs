//! Background eviction of expired permission-cache entries and idle
//! rate-limit keys.

use std::sync::Arc;
use std::time::Duration;

use actguard_security::PermissionsGate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rate_limit::RateLimiter;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the sweep loop on the current runtime. Returns `None` when called
/// outside a tokio runtime.
pub fn spawn_sweeper(
    permissions: Arc<PermissionsGate>,
    limiter: Arc<RateLimiter>,
    interval: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No tokio runtime; background sweeper not started");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = permissions.sweep_expired().await;
                    let idle = limiter.sweep().await;
                    debug!(expired, idle, "Sweep complete");
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use actguard_security::{AuditLog, RiskAssessor, Workspace};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeps_until_cancelled() {
        let permissions = Arc::new(
            PermissionsGate::new(Arc::new(RiskAssessor::new()), Arc::new(AuditLog::new(10)))
                .with_ttl(Duration::from_secs(5))
                .with_workspace(Workspace::new(["/srv/app"])),
        );
        let limiter = Arc::new(RateLimiter::new());
        permissions
            .check("/srv/app/readme.txt", actguard_core::OperationKind::Read, Default::default())
            .await
            .unwrap();
        limiter.check_limit("k", None).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            permissions.clone(),
            limiter.clone(),
            Duration::from_secs(61),
            cancel.clone(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(permissions.cached_entries().await, 0);
        assert_eq!(limiter.tracked_keys().await, 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
