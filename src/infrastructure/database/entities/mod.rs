//! Database entities

pub mod session;
pub mod station;
