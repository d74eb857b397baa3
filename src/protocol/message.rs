//! Wire protocol messages
//!
//! Newline-delimited UTF-8 JSON objects. Requests are a closed enum
//! tagged on `action`, so adding an action is a compile-time-checked
//! change instead of string dispatch.

use serde::{Deserialize, Serialize};

use crate::domain::{SessionSnapshot, StationStatus};

/// Server-bound requests, from stations and operator/API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Station announces itself on its data channel
    Init { station_id: i64 },
    /// Station registers the separate command socket
    RegisterCommand { station_id: i64 },
    /// Idle keep-alive, stamps last_connection only
    Heartbeat { station_id: i64 },
    /// In-progress energy report for an open session
    Update {
        station_id: i64,
        session_id: i64,
        user_id: i64,
        energy_consumed: f64,
    },
    GetStatus { station_id: i64 },

    // Operator/API intents
    Reserve { station_id: i64, user_id: i64 },
    Cancel { station_id: i64, user_id: i64 },
    StartCharging { station_id: i64, user_id: i64 },
    StopCharging {
        station_id: i64,
        user_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        energy_consumed: Option<f64>,
    },
    SetPower { station_id: i64, power: f64 },
    ListStations,
}

impl Request {
    /// The `action` tag, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::RegisterCommand { .. } => "register_command",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Update { .. } => "update",
            Self::GetStatus { .. } => "get_status",
            Self::Reserve { .. } => "reserve",
            Self::Cancel { .. } => "cancel",
            Self::StartCharging { .. } => "start_charging",
            Self::StopCharging { .. } => "stop_charging",
            Self::SetPower { .. } => "set_power",
            Self::ListStations => "list_stations",
        }
    }
}

/// Commands pushed station-ward over the command channel. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StationCommand {
    StartCharging { session_id: i64, user_id: i64 },
    StopCharging { user_id: i64 },
    SetPower { power: f64 },
}

/// One station row in a `list_stations` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub id: i64,
    pub power: f64,
    pub status: StationStatus,
    pub connected: bool,
}

/// Synchronous reply: `{"status": "success"|"error", ...payload}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_status: Option<StationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_consumed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_session: Option<SessionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stations: Option<Vec<StationInfo>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    #[default]
    Success,
    Error,
}

impl Reply {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_station_status(mut self, status: StationStatus) -> Self {
        self.station_status = Some(status);
        self
    }

    pub fn with_session_id(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy_consumed = Some(energy);
        self
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_decodes_from_action_tag() {
        let req: Request =
            serde_json::from_str(r#"{"action": "init", "station_id": 5}"#).unwrap();
        assert_eq!(req, Request::Init { station_id: 5 });

        let req: Request = serde_json::from_str(
            r#"{"action": "update", "station_id": 5, "session_id": 2, "user_id": 1, "energy_consumed": 3.5}"#,
        )
        .unwrap();
        assert_eq!(req.action(), "update");
    }

    #[test]
    fn unknown_action_is_a_decode_error() {
        let result = serde_json::from_str::<Request>(r#"{"action": "reboot", "station_id": 5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn stop_charging_energy_is_optional() {
        let req: Request = serde_json::from_str(
            r#"{"action": "stop_charging", "station_id": 5, "user_id": 1}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::StopCharging {
                station_id: 5,
                user_id: 1,
                energy_consumed: None
            }
        );
    }

    #[test]
    fn station_command_wire_shape() {
        let cmd = StationCommand::StartCharging {
            session_id: 12,
            user_id: 1,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""action":"start_charging""#));
        let back: StationCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn error_reply_carries_message_only() {
        let reply = Reply::error("station 5 not found");
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"station 5 not found"}"#);
    }

    #[test]
    fn success_reply_omits_empty_fields() {
        let json = serde_json::to_string(&Reply::success()).unwrap();
        assert_eq!(json, r#"{"status":"success"}"#);
    }
}
