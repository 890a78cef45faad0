//! Periodic removal of expired registrations.

use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::Controller;

/// Spawns the expiry sweep on the current runtime.
///
/// The task holds a weak reference so that it never keeps the controller
/// alive; it exits when cancelled or when the controller is dropped.
pub fn spawn(
    controller: Weak<Controller>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(controller, interval, cancel))
}

/// Runs the expiry sweep until cancelled.
pub async fn run(controller: Weak<Controller>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let removed = controller.reap_expired(Utc::now()).await;
                if removed > 0 {
                    debug!(removed, "expired registrations removed");
                }
            }
            () = cancel.cancelled() => {
                break;
            }
        }
    }

    debug!("expiry reaper stopped");
}
