//! Background server health monitoring.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use trawl_transport::ServerPool;

/// Periodic health prober.
///
/// Each round pings every server, refreshing the pool's health and
/// latency registry that placement decisions read. Probes above the
/// latency alert threshold are logged at WARN.
pub struct HealthMonitor {
    pool: Arc<ServerPool>,
    interval: Duration,
    latency_alert_ms: Option<f64>,
}

impl HealthMonitor {
    /// Create a monitor probing every `interval`.
    pub fn new(pool: Arc<ServerPool>, interval: Duration, latency_alert_ms: Option<f64>) -> Self {
        Self {
            pool,
            interval,
            latency_alert_ms,
        }
    }

    /// Run one probe round.
    pub async fn probe_once(&self) {
        for (server, result) in self.pool.ping_all().await {
            match result {
                Ok(latency) => {
                    let ms = latency.as_secs_f64() * 1000.0;
                    if let Some(threshold) = self.latency_alert_ms {
                        if ms > threshold {
                            warn!(server = %server, latency_ms = ms, threshold_ms = threshold,
                                "server latency above alert threshold");
                        }
                    }
                }
                Err(e) => warn!(server = %server, error = %e, "server probe failed"),
            }
        }
    }

    /// Probe until `shutdown` flips to true.
    ///
    /// Spawn this as a background task; drop the sender side of
    /// `shutdown` (after sending `true`) to stop it.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "health monitor started");
        loop {
            self.probe_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health monitor stopped");
    }
}
