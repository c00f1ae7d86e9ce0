//! Periodic trigger for the coordinator.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::{Coordinator, TriggerOutcome};

/// Trigger a cycle every `interval` until `shutdown` is cancelled.
///
/// The first cycle starts immediately. A cycle still running at shutdown is
/// cancelled.
pub async fn poll_loop(coordinator: Coordinator, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match coordinator.trigger().await {
            TriggerOutcome::Started(ticket) => {
                let cycle = ticket.cycle;
                tokio::select! {
                    () = shutdown.cancelled() => {
                        coordinator.cancel().await;
                        break;
                    }
                    report = ticket.wait() => {
                        if report.is_none() {
                            warn!(cycle, "Filter watch cycle ended without a report");
                        }
                    }
                }
            }
            TriggerOutcome::AlreadyPolling => debug!("Previous cycle still running"),
            TriggerOutcome::NoBoards => debug!("Nothing to watch"),
        }
    }

    info!("Filter watch scheduler stopped");
}
