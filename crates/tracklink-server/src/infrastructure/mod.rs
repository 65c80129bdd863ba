//! Infrastructure layer for tracklink-server.
//!
//! Everything that touches a socket, a file or a channel lives here:
//!
//! - [`server`]: device listener, connection cap, shutdown.
//! - [`connection`]: per-connection read loop.
//! - [`status`]: plaintext status port.
//! - [`fanout`]: broadcast publisher for decoded records.
//! - [`config_file`]: TOML configuration loader.

pub mod config_file;
pub mod connection;
pub mod fanout;
pub mod server;
pub mod status;

pub use config_file::{load_config, parse_config, ConfigError, FileConfig};
pub use connection::{serve_connection, ConnectionEnd, ConnectionSettings};
pub use fanout::BroadcastPublisher;
pub use server::{ServerError, TrackerServer};
