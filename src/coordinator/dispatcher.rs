//! Command dispatcher: best-effort push of commands to stations
//!
//! Fires only after a transition has committed, so a delivery failure
//! never rolls anything back. No retry, no queueing.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use crate::protocol::message::StationCommand;
use crate::registry::{ChannelKind, SharedConnectionRegistry};

pub type SharedCommandDispatcher = Arc<CommandDispatcher>;

pub struct CommandDispatcher {
    registry: SharedConnectionRegistry,
    /// Silence longer than this means offline for dispatch purposes,
    /// even while the registry entry lingers.
    liveness_window: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: SharedConnectionRegistry, liveness_window_secs: i64) -> Self {
        Self {
            registry,
            liveness_window: Duration::seconds(liveness_window_secs),
        }
    }

    pub fn shared(registry: SharedConnectionRegistry, liveness_window_secs: i64) -> SharedCommandDispatcher {
        Arc::new(Self::new(registry, liveness_window_secs))
    }

    /// Send a command to the station's command channel.
    ///
    /// Returns `false` when the station has no registered command channel,
    /// has been silent past the liveness window, or the send fails. A
    /// failed send drops the stale channel from the registry.
    pub fn send(&self, station_id: i64, command: &StationCommand) -> bool {
        if self
            .registry
            .idle_secs(station_id)
            .is_some_and(|idle| idle > self.liveness_window.num_seconds())
        {
            warn!(station_id, "Station silent past liveness window, skipping dispatch");
            return false;
        }

        let Some(sender) = self.registry.lookup(station_id, ChannelKind::Command) else {
            debug!(station_id, "No command channel for station");
            return false;
        };

        let frame = match serde_json::to_string(command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(station_id, error = %e, "Failed to encode command");
                return false;
            }
        };

        if let Err(e) = sender.send(frame) {
            warn!(station_id, error = %e, "Command channel gone, dropping it");
            self.registry.drop_channel(station_id, ChannelKind::Command);
            return false;
        }
        true
    }
}

// ── Tests ──────────────────────────────────────────────────────
