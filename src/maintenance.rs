//! Periodic housekeeping: purge lapsed refresh sessions and idle rate-limit
//! windows. Runs on its own schedule; nothing depends on it for correctness.

use crate::auth::AuthService;
use crate::middleware::AuthRateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

pub async fn run_maintenance(
    service: Arc<AuthService>,
    limiter: AuthRateLimiter,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_once(&service, &limiter).await;
    }
}

pub async fn run_once(service: &AuthService, limiter: &AuthRateLimiter) {
    match service.purge_expired_sessions().await {
        Ok(purged) => debug!(purged, "Session purge pass complete"),
        Err(e) => warn!(error = %e, "Session purge failed"),
    }

    let pruned = limiter.prune();
    if pruned > 0 {
        debug!(pruned, "Pruned idle rate-limit windows");
    }
}
