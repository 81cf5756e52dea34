//! Periodic quota reset

use crate::AdmissionController;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Zero every period counter each `period`, starting one period from now
///
/// Runs until the returned handle is aborted. A zero period is raised to
/// one second.
pub fn spawn_period_reset(controller: Arc<AdmissionController>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            controller.reset_period_counters();
            info!(
                accounts = controller.registry().len(),
                "Reset period traffic counters"
            );
        }
    })
}
