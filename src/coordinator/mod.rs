//! Coordinator core: state machine, session ledger, command dispatch,
//! liveness monitoring

pub mod dispatcher;
pub mod heartbeat;
pub mod ledger;
pub mod transitions;

pub use dispatcher::{CommandDispatcher, SharedCommandDispatcher};
pub use heartbeat::{HeartbeatMonitor, LivenessConfig};
pub use ledger::SessionLedger;
pub use transitions::{StartOutcome, StopOutcome, TransitionGuard};
