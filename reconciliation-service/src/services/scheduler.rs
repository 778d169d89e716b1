//! Background trigger for silent sync cycles.

use super::reconciliation::ReconciliationService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct SyncScheduler;

impl SyncScheduler {
    /// Run `sync_now(true)` every `period`, starting immediately.
    ///
    /// Cancelling `shutdown` stops the loop between cycles; a cycle already
    /// running is allowed to finish. A zero period disables the scheduler and
    /// returns `None`.
    pub fn spawn(
        service: Arc<ReconciliationService>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if period.is_zero() {
            tracing::info!("Sync scheduler disabled by configuration");
            return None;
        }

        tracing::info!(period_secs = period.as_secs(), "Starting sync scheduler");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Sync scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let result = service.sync_now(true).await;
                        tracing::debug!(
                            cycle_id = %result.cycle_id,
                            status = result.status.as_str(),
                            "Scheduled sync finished"
                        );
                    }
                }
            }
        }))
    }
}
