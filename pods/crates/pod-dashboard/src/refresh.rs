use crate::service::DashboardService;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default time between automatic reloads
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(300);

/// Reload every `period` while `visible` is true.
///
/// The first reload happens one full period after spawning. The loop exits
/// when the visibility sender is dropped.
pub fn spawn_refresh_loop(
    service: DashboardService,
    period: Duration,
    mut visible: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!("Refresh loop started, period {:?}", period);

        loop {
            ticker.tick().await;

            if visible.has_changed().is_err() {
                debug!("Visibility channel closed, stopping refresh loop");
                break;
            }
            if !*visible.borrow_and_update() {
                debug!("View hidden, skipping refresh");
                continue;
            }

            if let Err(e) = service.reload().await {
                warn!("Periodic reload failed: {}", e);
            }
        }
    })
}
