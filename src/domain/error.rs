//! Domain errors

use thiserror::Error;

/// Why a state transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// Station is already reserved or busy, cannot reserve
    AlreadyReserved,
    /// Station is already charging
    AlreadyCharging,
    /// Cancel requested but the station is not reserved
    NotReserved,
    /// Stop requested but the station is not charging
    NotCharging,
    /// Energy report below the last recorded value for the open session
    EnergyRegression,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyReserved => "station is already taken",
            Self::AlreadyCharging => "charging is already started",
            Self::NotReserved => "station is not reserved",
            Self::NotCharging => "station is not charging",
            Self::EnergyRegression => "reported energy is below the recorded value",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Domain-level error types
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("station {0} not found")]
    StationNotFound(i64),

    #[error("no open session for station {0}")]
    SessionNotFound(i64),

    #[error("conflict: {reason}")]
    Conflict { reason: ConflictReason },

    #[error("station {station_id} is held by another user")]
    OwnershipViolation { station_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl DomainError {
    pub fn conflict(reason: ConflictReason) -> Self {
        Self::Conflict { reason }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
