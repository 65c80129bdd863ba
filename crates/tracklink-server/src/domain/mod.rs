//! Domain layer for tracklink-server.
//!
//! Plain data types with no I/O: runtime configuration and the device session
//! model.  Everything here can be built and inspected in tests without a
//! runtime or a socket.

pub mod config;
pub mod session;

pub use config::ServerConfig;
pub use session::{ConnectionContext, ConnectionId, DeviceSession, RegistryStats};
