//! Charging session domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One charging occurrence bounded by a start and a stop transition.
///
/// Invariant: at most one session with `end_time == None` exists per
/// station; its `user_id` equals the station's `using_by` while open.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingSession {
    pub id: i64,
    pub station_id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// kWh, monotonically non-decreasing while the session is open
    pub energy_consumed: Option<f64>,
    /// Snapshot of the station's cumulative meter at session start
    pub initial_electricity_meter: f64,
    pub end_electricity_meter: Option<f64>,
}

impl ChargingSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Session snapshot handed to a reconnecting station on `init`.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            user_id: self.user_id,
            start_time: self.start_time,
            energy_consumed: self.energy_consumed.unwrap_or(0.0),
            initial_electricity_meter: self.initial_electricity_meter,
        }
    }
}

/// Open-session state returned in the `init` reply so a reconnecting
/// station can resume its local energy counter without double-counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: i64,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub energy_consumed: f64,
    pub initial_electricity_meter: f64,
}

/// Energy accrued by a station charging at `power` kW since `start_time`.
pub fn energy_for_elapsed(power: f64, start_time: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = now.signed_duration_since(start_time).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0.0;
    }
    power * (elapsed_ms as f64 / 3_600_000.0)
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn one_hour_at_rated_power() {
        let start = Utc::now();
        let energy = energy_for_elapsed(10.0, start, start + Duration::hours(1));
        assert!((energy - 10.0).abs() < 1e-9);
    }

    #[test]
    fn partial_hour_scales_linearly() {
        let start = Utc::now();
        let energy = energy_for_elapsed(22.0, start, start + Duration::minutes(15));
        assert!((energy - 5.5).abs() < 1e-9);
    }

    #[test]
    fn clock_skew_never_goes_negative() {
        let start = Utc::now();
        assert_eq!(energy_for_elapsed(10.0, start, start - Duration::seconds(5)), 0.0);
    }

    #[test]
    fn snapshot_carries_resume_state() {
        let session = ChargingSession {
            id: 7,
            station_id: 5,
            user_id: 1,
            start_time: Utc::now(),
            end_time: None,
            energy_consumed: Some(2.5),
            initial_electricity_meter: 100.0,
            end_electricity_meter: None,
        };
        assert!(session.is_open());
        let snap = session.snapshot();
        assert_eq!(snap.id, 7);
        assert_eq!(snap.energy_consumed, 2.5);
        assert_eq!(snap.initial_electricity_meter, 100.0);
    }
}
