//! Per-station connection state held by the registry

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// The two sockets a station registers with the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Telemetry link: init, heartbeat, update, synchronous replies
    Data,
    /// Separate socket the coordinator pushes commands through
    Command,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// One live socket, represented by the sender half of its writer task.
#[derive(Debug, Clone)]
pub struct Link {
    pub sender: mpsc::UnboundedSender<String>,
}

impl Link {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    pub fn same_channel(&self, sender: &mpsc::UnboundedSender<String>) -> bool {
        self.sender.same_channel(sender)
    }
}

/// Both channels of one station. Either may register first.
#[derive(Debug, Default)]
pub struct StationChannels {
    pub data: Option<Link>,
    pub command: Option<Link>,
    /// Last message seen on either channel
    pub last_activity: DateTime<Utc>,
}

impl StationChannels {
    pub fn new() -> Self {
        Self {
            data: None,
            command: None,
            last_activity: Utc::now(),
        }
    }

    pub fn slot(&self, kind: ChannelKind) -> &Option<Link> {
        match kind {
            ChannelKind::Data => &self.data,
            ChannelKind::Command => &self.command,
        }
    }

    pub fn slot_mut(&mut self, kind: ChannelKind) -> &mut Option<Link> {
        match kind {
            ChannelKind::Data => &mut self.data,
            ChannelKind::Command => &mut self.command,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.command.is_none()
    }

    /// Seconds of silence relative to `now`.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_activity).num_seconds()
    }
}
