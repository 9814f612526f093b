use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::AppState;

/// Periodic single-flight sweep that deactivates manual overrides whose
/// expiry has passed. Idempotent and crash-safe: a lost tick at most
/// postpones expiry by one period.
pub fn spawn_expiry_worker(state: AppState) {
    let period = Duration::from_secs(state.cfg.expiry_worker.period_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = state.clock.now();
            match state.repos.manual.expire_due(now).await {
                Ok(0) => debug!("expiry sweep: nothing due"),
                Ok(count) => info!(count, "expiry sweep deactivated overrides"),
                Err(e) => warn!(error = %e, "expiry sweep failed"),
            }
        }
    });
}
