//! Core business entities, types and errors

pub mod error;
pub mod session;
pub mod station;

pub use error::{ConflictReason, DomainError, DomainResult};
pub use session::{energy_for_elapsed, ChargingSession, SessionSnapshot};
pub use station::{Station, StationStatus};
