//! # Fleet Coordinator
//!
//! TCP coordinator for a fleet of EV charging stations.
//!
//! ## Architecture
//!
//! - **domain**: Station state machine, session types and errors
//! - **coordinator**: Transitions, session ledger, command dispatch,
//!   liveness monitoring
//! - **registry**: In-memory map of live station connections
//! - **protocol**: Newline-framed JSON message types and the two TCP
//!   listeners (station + operator)
//! - **infrastructure**: SeaORM entities and migrations
//! - **agent**: Reference station-side client
//!
//! Stations keep two sockets open: a data channel for requests they
//! originate (`init`, `heartbeat`, `update`) and a command channel the
//! coordinator pushes `start_charging`/`stop_charging`/`set_power`
//! frames down. Operators talk to a separate listener with the same
//! framing.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod infrastructure;
pub mod protocol;
pub mod registry;
pub mod support;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::database::{init_database, DatabaseConfig};

pub use coordinator::{CommandDispatcher, HeartbeatMonitor, SessionLedger, TransitionGuard};
pub use protocol::{CoordinatorContext, ProtocolConfig, ProtocolServer};
pub use registry::ConnectionRegistry;
