//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for runtime settings.  It is
//! a plain struct with no I/O; the infrastructure layer fills it from a TOML
//! file and the binary layers CLI flags on top.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tracklink_core::FramePolicy;

/// Default port of the binary device protocol.
pub const DEFAULT_TCP_PORT: u16 = 3000;

/// Default port of the plaintext status listener.
pub const DEFAULT_STATUS_PORT: u16 = 3001;

/// All runtime configuration for the ingest server.
///
/// # Example
///
/// ```rust
/// use tracklink_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.device_addr.port(), 3000);
/// assert_eq!(cfg.max_connections, 100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listener for tracker connections.
    pub device_addr: SocketAddr,

    /// Listener for the plaintext status probe; `None` disables it.
    pub status_addr: Option<SocketAddr>,

    /// How long a connection may stay silent before it is closed.
    pub read_timeout: Duration,

    /// Connections beyond this count are closed right after accept.
    pub max_connections: usize,

    /// Checksum rules applied to every data frame.
    pub frame_policy: FramePolicy,

    /// Cap on unconsumed bytes held per connection while a frame is incomplete.
    pub max_frame_buffer: usize,

    /// Capacity of the record fan-out channel.  Slow subscribers lose the
    /// oldest records once it fills.
    pub fanout_capacity: usize,

    /// Whether `0x15` packets get an acknowledgement.
    pub ack_ignorable: bool,

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    /// | Field            | Default          |
    /// |------------------|------------------|
    /// | device_addr      | `0.0.0.0:3000`   |
    /// | status_addr      | `0.0.0.0:3001`   |
    /// | read_timeout     | 30 seconds       |
    /// | max_connections  | 100              |
    /// | frame_policy     | CRC from 32 bytes|
    /// | max_frame_buffer | 64 KiB           |
    /// | fanout_capacity  | 1024             |
    /// | ack_ignorable    | `true`           |
    /// | log_level        | `info`           |
    fn default() -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            device_addr: SocketAddr::new(any, DEFAULT_TCP_PORT),
            status_addr: Some(SocketAddr::new(any, DEFAULT_STATUS_PORT)),
            read_timeout: Duration::from_secs(30),
            max_connections: 100,
            frame_policy: FramePolicy::default(),
            max_frame_buffer: 64 * 1024,
            fanout_capacity: 1024,
            ack_ignorable: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Settings for loopback tests: ephemeral ports, short timeout.
    pub fn loopback() -> Self {
        let lo = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            device_addr: SocketAddr::new(lo, 0),
            status_addr: Some(SocketAddr::new(lo, 0)),
            read_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
