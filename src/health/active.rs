//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe backends
//! - Join each cycle before the next tick so slow backends cannot pile up probes
//! - Feed results back into the pool's unhealthy set

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{self, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::pool::Pool;

pub struct HealthMonitor {
    pool: Arc<Pool>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(pool: Arc<Pool>, interval: Duration) -> Self {
        Self { pool, interval }
    }

    /// Probe on every tick until `shutdown` fires.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval = ?self.interval,
            backends = self.pool.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    check_all(&self.pool).await;
                }
                _ = shutdown.wait() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Run one probe cycle over the pool's current backends.
pub async fn check_all(pool: &Pool) {
    let backends = pool.backends();
    if backends.is_empty() {
        tracing::debug!("No backends to probe");
        return;
    }

    let results = join_all(backends.iter().map(|backend| async move {
        let result = backend.probe().await;
        (backend, result)
    }))
    .await;

    for (backend, result) in results {
        pool.record_health(backend, &result);
    }
}
