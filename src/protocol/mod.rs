//! TCP protocol surface: message types, routing, and the server loops

pub mod handler;
pub mod message;
pub mod server;

pub use handler::CoordinatorContext;
pub use message::{Reply, ReplyStatus, Request, StationCommand, StationInfo};
pub use server::{BoundProtocolServer, ProtocolConfig, ProtocolServer};
