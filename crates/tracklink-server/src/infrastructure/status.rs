//! Plaintext status port.
//!
//! Every connection gets one HTTP/1.1 response and is closed.  `GET /devices`
//! returns the registry snapshot as JSON; anything else returns a fixed
//! liveness line.  This is a probe for load balancers and operators, not an
//! HTTP server: the request is read once and never parsed beyond its first
//! line.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::application::DeviceRegistry;
use crate::domain::{DeviceSession, RegistryStats};

/// Body returned to any request other than `GET /devices`.
pub const STATUS_TEXT: &str = "TrackLink OK";

/// How long to wait for the request before answering anyway.
const REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct DevicesView<'a> {
    stats: RegistryStats,
    devices: &'a [DeviceSession],
}

/// Builds the full HTTP response for `request`.
pub fn render_response(request: &[u8], registry: &DeviceRegistry) -> Vec<u8> {
    let first_line = request
        .split(|&b| b == b'\n')
        .next()
        .map(|line| String::from_utf8_lossy(line).trim().to_owned())
        .unwrap_or_default();

    let mut parts = first_line.split_whitespace();
    let wants_devices = parts.next() == Some("GET") && parts.next() == Some("/devices");

    if wants_devices {
        let devices = registry.snapshot();
        let view = DevicesView {
            stats: registry.stats(),
            devices: &devices,
        };
        match serde_json::to_vec(&view) {
            Ok(body) => return http_response("application/json", &body),
            Err(e) => warn!("failed to serialise device snapshot: {e}"),
        }
    }

    http_response("text/plain; charset=utf-8", STATUS_TEXT.as_bytes())
}

fn http_response(content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// Accepts status connections until `shutdown` is cancelled.
///
/// Each reply runs on `tasks`, so a caller waiting on the tracker also waits
/// for replies still in flight.
pub async fn run_status_listener(
    listener: TcpListener,
    registry: Arc<DeviceRegistry>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "status request");
                    let registry = Arc::clone(&registry);
                    tasks.spawn(async move {
                        if let Err(e) = answer(stream, &registry).await {
                            debug!(%peer, "status reply failed: {e}");
                        }
                    });
                }
                Err(e) => warn!("status accept error: {e}"),
            },
        }
    }
    info!("status listener stopped");
}

async fn answer(mut stream: TcpStream, registry: &DeviceRegistry) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    // A client that sends nothing still gets the liveness line.
    let n = match timeout(REQUEST_TIMEOUT, stream.read(&mut buf)).await {
        Ok(res) => res?,
        Err(_) => 0,
    };
    stream.write_all(&render_response(&buf[..n], registry)).await?;
    stream.shutdown().await
}
