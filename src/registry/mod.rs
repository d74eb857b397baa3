//! Connection registry: maps station ids to their live sockets
//!
//! The registry answers one question only: is something listening for
//! this station right now. The database row stays authoritative for
//! status and ownership; readers must never infer state from an entry
//! being present.

pub mod connection;

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use connection::{ChannelKind, Link, StationChannels};

/// Thread-safe registry of active station connections
pub struct ConnectionRegistry {
    stations: DashMap<i64, StationChannels>,
}

/// Shared, reference-counted connection registry
pub type SharedConnectionRegistry = Arc<ConnectionRegistry>;

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            stations: DashMap::new(),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedConnectionRegistry {
        Arc::new(Self::new())
    }

    /// Register one channel of a station. A reconnect replaces the old link.
    pub fn register(&self, station_id: i64, kind: ChannelKind, sender: mpsc::UnboundedSender<String>) {
        info!(station_id, channel = %kind, "Registering station channel");
        let mut entry = self.stations.entry(station_id).or_insert_with(StationChannels::new);
        *entry.slot_mut(kind) = Some(Link::new(sender));
        entry.last_activity = Utc::now();
    }

    /// Remove both channels for a station. Idempotent.
    pub fn unregister(&self, station_id: i64) {
        if self.stations.remove(&station_id).is_some() {
            info!(station_id, "Unregistered station connection");
        }
    }

    /// Remove the station's entry when `sender` still owns any of its
    /// channels. A disconnect takes both channel kinds with it no matter
    /// which socket triggered it; a socket a reconnect has fully
    /// superseded removes nothing, so a stale socket's teardown cannot
    /// evict the fresh links.
    pub fn unregister_matching(&self, station_id: i64, sender: &mpsc::UnboundedSender<String>) {
        let owns_a_channel = self.stations.get(&station_id).is_some_and(|entry| {
            [ChannelKind::Data, ChannelKind::Command].into_iter().any(|kind| {
                entry
                    .slot(kind)
                    .as_ref()
                    .is_some_and(|link| link.same_channel(sender))
            })
        });
        if owns_a_channel {
            self.unregister(station_id);
        }
    }

    /// Drop a single stale channel (dispatcher cleanup after a send failure).
    pub fn drop_channel(&self, station_id: i64, kind: ChannelKind) {
        let mut drop_entry = false;
        if let Some(mut entry) = self.stations.get_mut(&station_id) {
            if entry.slot_mut(kind).take().is_some() {
                warn!(station_id, channel = %kind, "Dropped stale station channel");
            }
            drop_entry = entry.is_empty();
        }
        if drop_entry {
            self.unregister(station_id);
        }
    }

    /// Sender for one channel of a station, if registered.
    pub fn lookup(&self, station_id: i64, kind: ChannelKind) -> Option<mpsc::UnboundedSender<String>> {
        self.stations
            .get(&station_id)
            .and_then(|entry| entry.slot(kind).as_ref().map(|link| link.sender.clone()))
    }

    /// Whether any channel is registered for the station.
    pub fn is_connected(&self, station_id: i64) -> bool {
        self.stations.contains_key(&station_id)
    }

    /// Stamp activity for a station (any inbound message).
    pub fn touch(&self, station_id: i64) {
        if let Some(mut entry) = self.stations.get_mut(&station_id) {
            entry.last_activity = Utc::now();
        }
    }

    /// Seconds since the station's last message, if it is registered.
    pub fn idle_secs(&self, station_id: i64) -> Option<i64> {
        self.stations
            .get(&station_id)
            .map(|entry| entry.idle_secs(Utc::now()))
    }

    /// Stations silent for longer than `window`.
    pub fn idle_stations(&self, window: Duration) -> Vec<i64> {
        let now = Utc::now();
        self.stations
            .iter()
            .filter(|entry| entry.idle_secs(now) > window.num_seconds())
            .map(|entry| *entry.key())
            .collect()
    }

    /// All registered station ids.
    pub fn connected_ids(&self) -> Vec<i64> {
        self.stations.iter().map(|e| *e.key()).collect()
    }

    /// Number of registered stations
    pub fn count(&self) -> usize {
        self.stations.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────
