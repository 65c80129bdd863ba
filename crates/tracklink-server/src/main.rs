//! TrackLink ingest server: entry point.
//!
//! Listens for GPS trackers on a raw TCP port, acknowledges every accepted
//! frame and keeps an in-memory registry of device sessions.  A second
//! plaintext port answers liveness probes and `GET /devices`.
//!
//! # Usage
//!
//! ```text
//! tracklink-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>               TOML configuration file
//!   --bind <IP>                   Address for both listeners [default: 0.0.0.0]
//!   --tcp-port <PORT>             Device protocol port [default: 3000]
//!   --status-port <PORT>          Status port, 0 disables [default: 3001]
//!   --read-timeout <SECS>         Idle read timeout [default: 30]
//!   --max-connections <N>         Concurrent connection cap [default: 100]
//!   --checksum-threshold <BYTES>  Body length from which CRC is checked [default: 32]
//!   --log-level <FILTER>          Used when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then flags.  Every flag can
//! also be given as an environment variable:
//!
//! | Variable                        | Flag                   |
//! |---------------------------------|------------------------|
//! | `TRACKLINK_CONFIG`              | `--config`             |
//! | `TRACKLINK_BIND`                | `--bind`               |
//! | `TRACKLINK_TCP_PORT`            | `--tcp-port`           |
//! | `TRACKLINK_STATUS_PORT`         | `--status-port`        |
//! | `TRACKLINK_READ_TIMEOUT`        | `--read-timeout`       |
//! | `TRACKLINK_MAX_CONNECTIONS`     | `--max-connections`    |
//! | `TRACKLINK_CHECKSUM_THRESHOLD`  | `--checksum-threshold` |
//! | `TRACKLINK_LOG_LEVEL`           | `--log-level`          |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tracklink_server::application::DeviceRegistry;
use tracklink_server::domain::ServerConfig;
use tracklink_server::infrastructure::{load_config, BroadcastPublisher, FileConfig, TrackerServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Ingest server for Galileosky-style GPS trackers.
///
/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "tracklink-server",
    about = "TCP ingest server for Galileosky-style GPS trackers",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "TRACKLINK_CONFIG")]
    config: Option<PathBuf>,

    /// IP address both listeners bind to.
    #[arg(long, env = "TRACKLINK_BIND")]
    bind: Option<String>,

    /// Port for tracker connections.
    #[arg(long, env = "TRACKLINK_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Port for the plaintext status probe; 0 disables it.
    #[arg(long, env = "TRACKLINK_STATUS_PORT")]
    status_port: Option<u16>,

    /// Seconds a connection may stay silent before it is closed.
    #[arg(long, env = "TRACKLINK_READ_TIMEOUT")]
    read_timeout: Option<u64>,

    /// Maximum number of concurrent tracker connections.
    #[arg(long, env = "TRACKLINK_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Body length from which the frame checksum is verified.
    #[arg(long, env = "TRACKLINK_CHECKSUM_THRESHOLD")]
    checksum_threshold: Option<usize>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "TRACKLINK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any) and applies flag overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if the
    /// bind address is not a valid IP address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(bind) = self.bind {
            file.network.bind_address = bind;
        }
        if let Some(port) = self.tcp_port {
            file.network.tcp_port = port;
        }
        if let Some(port) = self.status_port {
            file.network.status_port = port;
        }
        if let Some(secs) = self.read_timeout {
            file.connections.read_timeout_secs = secs;
        }
        if let Some(max) = self.max_connections {
            file.connections.max_connections = max;
        }
        if let Some(threshold) = self.checksum_threshold {
            file.protocol.checksum_threshold = threshold;
        }
        if let Some(level) = self.log_level {
            file.logging.level = level;
        }

        file.into_server_config().context("invalid configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // RUST_LOG wins; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "TrackLink server starting: devices={}, status={:?}",
        config.device_addr, config.status_addr
    );

    let registry = Arc::new(DeviceRegistry::new());
    let publisher = BroadcastPublisher::new(config.fanout_capacity);
    spawn_record_log(&publisher);

    let server = TrackerServer::bind(config, Arc::clone(&registry), Arc::new(publisher)).await?;

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C; shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
        trigger.cancel();
    });

    server.run(shutdown).await;

    let stats = registry.stats();
    info!(
        devices = stats.devices,
        records = stats.total_records,
        "TrackLink server stopped"
    );
    Ok(())
}

/// Logs every published record at debug level.
fn spawn_record_log(publisher: &BroadcastPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => debug!(
                    identity = ?record.identity,
                    timestamp = ?record.timestamp,
                    latitude = ?record.latitude,
                    longitude = ?record.longitude,
                    speed = ?record.speed_kmh,
                    "record"
                ),
                Err(RecvError::Lagged(n)) => warn!("record log lagged; {n} record(s) skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
