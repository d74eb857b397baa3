//! Charging station domain entity and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{ConflictReason, DomainError, DomainResult};

/// Station status: free → reserved → busy → free
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    Free,
    Reserved,
    Busy,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Reserved => "reserved",
            Self::Busy => "busy",
        }
    }

    /// Strict parse; an unrecognized string is the caller's problem to
    /// surface, never silently a valid status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "reserved" => Some(Self::Reserved),
            "busy" => Some(Self::Busy),
            _ => None,
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A physical charging point with a rated power and a cumulative meter.
///
/// Invariant: `reserved_by` and `using_by` are mutually exclusive and both
/// `None` when the status is `Free`.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: i64,
    /// Rated power in kW, mutable by operator command
    pub power: f64,
    /// Cumulative energy meter in kWh, monotonic non-decreasing
    pub power_consumption: f64,
    pub status: StationStatus,
    pub reserved_by: Option<i64>,
    pub using_by: Option<i64>,
    pub last_connection: Option<DateTime<Utc>>,
}

impl Station {
    /// Validate a `free → reserved` transition.
    pub fn check_reserve(&self) -> DomainResult<()> {
        match self.status {
            StationStatus::Free => Ok(()),
            StationStatus::Reserved => Err(DomainError::conflict(ConflictReason::AlreadyReserved)),
            StationStatus::Busy => Err(DomainError::conflict(ConflictReason::AlreadyReserved)),
        }
    }

    /// Validate a `reserved → free` cancellation by `user_id`.
    pub fn check_cancel(&self, user_id: i64) -> DomainResult<()> {
        match self.status {
            StationStatus::Reserved if self.reserved_by == Some(user_id) => Ok(()),
            StationStatus::Reserved => Err(DomainError::OwnershipViolation {
                station_id: self.id,
            }),
            _ => Err(DomainError::conflict(ConflictReason::NotReserved)),
        }
    }

    /// Validate a `free → busy` or `reserved → busy` transition by `user_id`.
    ///
    /// No reservation is required: a free station can be started directly.
    pub fn check_start(&self, user_id: i64) -> DomainResult<()> {
        match self.status {
            StationStatus::Free => Ok(()),
            StationStatus::Reserved if self.reserved_by == Some(user_id) => Ok(()),
            StationStatus::Reserved => Err(DomainError::OwnershipViolation {
                station_id: self.id,
            }),
            StationStatus::Busy => Err(DomainError::conflict(ConflictReason::AlreadyCharging)),
        }
    }

    /// Validate a `busy → free` stop by `user_id`.
    pub fn check_stop(&self, user_id: i64) -> DomainResult<()> {
        match self.status {
            StationStatus::Busy if self.using_by == Some(user_id) => Ok(()),
            StationStatus::Busy => Err(DomainError::OwnershipViolation {
                station_id: self.id,
            }),
            _ => Err(DomainError::conflict(ConflictReason::NotCharging)),
        }
    }

    /// Check the free-state ownership invariant.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            StationStatus::Free => self.reserved_by.is_none() && self.using_by.is_none(),
            StationStatus::Reserved => self.reserved_by.is_some() && self.using_by.is_none(),
            StationStatus::Busy => self.using_by.is_some(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn station(status: StationStatus, reserved_by: Option<i64>, using_by: Option<i64>) -> Station {
        Station {
            id: 5,
            power: 10.0,
            power_consumption: 0.0,
            status,
            reserved_by,
            using_by,
            last_connection: None,
        }
    }

    #[test]
    fn reserve_only_when_free() {
        assert!(station(StationStatus::Free, None, None).check_reserve().is_ok());
        assert!(matches!(
            station(StationStatus::Reserved, Some(1), None).check_reserve(),
            Err(DomainError::Conflict { .. })
        ));
        assert!(matches!(
            station(StationStatus::Busy, None, Some(1)).check_reserve(),
            Err(DomainError::Conflict { .. })
        ));
    }

    #[test]
    fn cancel_requires_owner() {
        let s = station(StationStatus::Reserved, Some(1), None);
        assert!(s.check_cancel(1).is_ok());
        assert!(matches!(
            s.check_cancel(2),
            Err(DomainError::OwnershipViolation { station_id: 5 })
        ));
    }

    #[test]
    fn cancel_on_free_is_conflict() {
        assert!(matches!(
            station(StationStatus::Free, None, None).check_cancel(1),
            Err(DomainError::Conflict {
                reason: crate::domain::ConflictReason::NotReserved
            })
        ));
    }

    #[test]
    fn start_allowed_from_free_without_reservation() {
        assert!(station(StationStatus::Free, None, None).check_start(1).is_ok());
    }

    #[test]
    fn start_on_reservation_requires_owner() {
        let s = station(StationStatus::Reserved, Some(1), None);
        assert!(s.check_start(1).is_ok());
        assert!(matches!(
            s.check_start(2),
            Err(DomainError::OwnershipViolation { .. })
        ));
    }

    #[test]
    fn start_while_busy_is_conflict() {
        assert!(matches!(
            station(StationStatus::Busy, None, Some(1)).check_start(1),
            Err(DomainError::Conflict {
                reason: crate::domain::ConflictReason::AlreadyCharging
            })
        ));
    }

    #[test]
    fn stop_requires_current_user() {
        let s = station(StationStatus::Busy, None, Some(1));
        assert!(s.check_stop(1).is_ok());
        assert!(matches!(
            s.check_stop(2),
            Err(DomainError::OwnershipViolation { .. })
        ));
        assert!(matches!(
            station(StationStatus::Free, None, None).check_stop(1),
            Err(DomainError::Conflict { .. })
        ));
    }

    #[test]
    fn free_station_owns_nobody() {
        assert!(station(StationStatus::Free, None, None).invariant_holds());
        assert!(!station(StationStatus::Free, Some(1), None).invariant_holds());
        assert!(!station(StationStatus::Free, None, Some(1)).invariant_holds());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [StationStatus::Free, StationStatus::Reserved, StationStatus::Busy] {
            assert_eq!(StationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn corrupt_status_string_does_not_parse() {
        assert_eq!(StationStatus::parse("chargin"), None);
        assert_eq!(StationStatus::parse(""), None);
        assert_eq!(StationStatus::parse("Free"), None);
    }
}
