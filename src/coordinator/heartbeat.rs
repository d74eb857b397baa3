//! Heartbeat/liveness monitor
//!
//! The passive path lives in the protocol handler: `heartbeat`/`update`
//! stamp `last_connection` and touch the registry entry. This module is
//! the active half: a background sweep that evicts registry entries for
//! stations silent past the liveness window, so dispatch stops trusting
//! them before the socket ever errors out.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::registry::SharedConnectionRegistry;
use crate::support::shutdown::ShutdownSignal;

/// Liveness configuration
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often the sweep runs (seconds)
    pub check_interval_secs: u64,
    /// Silence past this means disconnected (seconds). Three missed
    /// idle heartbeats at the 30s client rate.
    pub offline_after_secs: i64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            offline_after_secs: 90,
        }
    }
}

/// Background liveness sweep over the connection registry.
pub struct HeartbeatMonitor {
    registry: SharedConnectionRegistry,
    config: LivenessConfig,
}

impl HeartbeatMonitor {
    pub fn new(registry: SharedConnectionRegistry, config: LivenessConfig) -> Self {
        Self { registry, config }
    }

    /// Spawn the sweep task. Runs until the shutdown signal fires.
    pub fn start(&self, shutdown: ShutdownSignal) {
        let registry = self.registry.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            info!(
                check_interval_secs = config.check_interval_secs,
                offline_after_secs = config.offline_after_secs,
                "Heartbeat monitor started"
            );

            let mut interval = tokio::time::interval(Duration::from_secs(config.check_interval_secs));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sweep(&registry, config.offline_after_secs);
                    }
                    _ = shutdown.wait() => {
                        info!("Heartbeat monitor shutting down");
                        break;
                    }
                }
            }
        });
    }
}

/// Evict every station silent for longer than the window.
fn sweep(registry: &SharedConnectionRegistry, offline_after_secs: i64) {
    let stale = registry.idle_stations(chrono::Duration::seconds(offline_after_secs));
    if stale.is_empty() {
        debug!(connected = registry.count(), "Liveness sweep: all stations alive");
        return;
    }
    for station_id in stale {
        warn!(station_id, "Station silent past liveness window, evicting connection");
        registry.unregister(station_id);
    }
}

// ── Tests ──────────────────────────────────────────────────────
