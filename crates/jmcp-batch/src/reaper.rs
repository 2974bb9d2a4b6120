use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::BatchOrchestrator;

/// Periodically drop finished operations past their retention until
/// `shutdown` fires.
pub fn spawn_reaper(
    orchestrator: Arc<BatchOrchestrator>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticks.tick() => {
                    orchestrator.reap_finished(Utc::now());
                }
            }
        }
        debug!("batch reaper stopped");
    })
}
