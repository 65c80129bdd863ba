//! TOML configuration file.
//!
//! The file is optional and every field has a default, so a partial file only
//! overrides what it names:
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! tcp_port = 3000
//! status_port = 3001      # 0 disables the status listener
//!
//! [connections]
//! read_timeout_secs = 30
//! max_connections = 100
//! max_frame_buffer = 65536
//!
//! [protocol]
//! checksum_threshold = 32
//! ack_ignorable = true
//!
//! [fanout]
//! capacity = 1024
//!
//! [logging]
//! level = "info"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tracklink_core::protocol::frame::MAX_FRAME_LEN;
use tracklink_core::FramePolicy;

use crate::domain::config::{ServerConfig, DEFAULT_STATUS_PORT, DEFAULT_TCP_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    /// A numeric setting is below the smallest usable value.
    #[error("{field} = {value} is below the minimum of {min}")]
    OutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub connections: ConnectionsSection,
    #[serde(default)]
    pub protocol: ProtocolSection,
    #[serde(default)]
    pub fanout: FanoutSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address both listeners bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// `0` disables the status listener.
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionsSection {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_frame_buffer")]
    pub max_frame_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolSection {
    /// Body length from which the CRC is verified.
    #[serde(default = "default_checksum_threshold")]
    pub checksum_threshold: usize,
    #[serde(default = "default_true")]
    pub ack_ignorable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanoutSection {
    #[serde(default = "default_fanout_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_status_port() -> u16 {
    DEFAULT_STATUS_PORT
}
fn default_read_timeout_secs() -> u64 {
    30
}
fn default_max_connections() -> usize {
    100
}
fn default_max_frame_buffer() -> usize {
    64 * 1024
}
fn default_checksum_threshold() -> usize {
    tracklink_core::protocol::frame::DEFAULT_CHECKSUM_THRESHOLD
}
fn default_true() -> bool {
    true
}
fn default_fanout_capacity() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            tcp_port: default_tcp_port(),
            status_port: default_status_port(),
        }
    }
}

impl Default for ConnectionsSection {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            max_connections: default_max_connections(),
            max_frame_buffer: default_max_frame_buffer(),
        }
    }
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            checksum_threshold: default_checksum_threshold(),
            ack_ignorable: default_true(),
        }
    }
}

impl Default for FanoutSection {
    fn default() -> Self {
        Self {
            capacity: default_fanout_capacity(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl FileConfig {
    /// Converts the file layout into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP,
    /// and [`ConfigError::OutOfRange`] if `max_connections` is zero or
    /// `max_frame_buffer` cannot hold the largest frame.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        at_least("max_connections", self.connections.max_connections, 1)?;
        at_least("max_frame_buffer", self.connections.max_frame_buffer, MAX_FRAME_LEN)?;

        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.network.bind_address.clone()))?;

        Ok(ServerConfig {
            device_addr: SocketAddr::new(ip, self.network.tcp_port),
            status_addr: (self.network.status_port != 0)
                .then(|| SocketAddr::new(ip, self.network.status_port)),
            read_timeout: Duration::from_secs(self.connections.read_timeout_secs),
            max_connections: self.connections.max_connections,
            frame_policy: FramePolicy {
                checksum_threshold: self.protocol.checksum_threshold,
            },
            max_frame_buffer: self.connections.max_frame_buffer,
            fanout_capacity: self.fanout.capacity,
            ack_ignorable: self.protocol.ack_ignorable,
            log_level: self.logging.level,
        })
    }
}

fn at_least(field: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange { field, value, min });
    }
    Ok(())
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from `path`, which must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}
