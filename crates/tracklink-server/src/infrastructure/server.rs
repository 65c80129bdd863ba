//! Device listener: accept loop, connection cap and shutdown.
//!
//! [`TrackerServer::bind`] opens both listeners up front so the caller learns
//! about port conflicts before anything runs.  [`TrackerServer::run`] then
//! accepts device connections until the shutdown token is cancelled:
//!
//! - Each connection runs [`serve_connection`] in its own task.
//! - A semaphore caps concurrent connections.  When no permit is free the new
//!   socket is closed immediately.
//! - On shutdown the listeners are dropped, every connection task sees the
//!   same token and closes its socket, and `run` returns once all tasks have
//!   finished, status replies included.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::application::{DeviceRegistry, Ingestor, RecordPublisher};
use crate::domain::{ConnectionContext, ServerConfig};
use crate::infrastructure::connection::{serve_connection, ConnectionSettings};
use crate::infrastructure::status::run_status_listener;

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {role} listener on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A bound, not yet running, ingest server.
pub struct TrackerServer {
    config: ServerConfig,
    device_listener: TcpListener,
    device_addr: SocketAddr,
    status_listener: Option<TcpListener>,
    status_addr: Option<SocketAddr>,
    ingestor: Ingestor,
}

impl TrackerServer {
    /// Binds the device listener and, if configured, the status listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if either address cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn RecordPublisher>,
    ) -> Result<Self, ServerError> {
        let (device_listener, device_addr) = bind_listener("device", config.device_addr).await?;

        let (status_listener, status_addr) = match config.status_addr {
            Some(addr) => {
                let (listener, local) = bind_listener("status", addr).await?;
                (Some(listener), Some(local))
            }
            None => (None, None),
        };

        let ingestor = Ingestor::from_config(&config, registry, publisher);

        Ok(Self {
            config,
            device_listener,
            device_addr,
            status_listener,
            status_addr,
            ingestor,
        })
    }

    /// Address the device listener is bound to.
    pub fn device_addr(&self) -> SocketAddr {
        self.device_addr
    }

    /// Address the status listener is bound to, if enabled.
    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status_addr
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.ingestor.registry()
    }

    /// Serves connections until `shutdown` is cancelled, then waits for every
    /// connection task to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            config,
            device_listener,
            device_addr,
            status_listener,
            status_addr,
            ingestor,
        } = self;

        let tasks = TaskTracker::new();

        if let Some(listener) = status_listener {
            tasks.spawn(run_status_listener(
                listener,
                Arc::clone(ingestor.registry()),
                tasks.clone(),
                shutdown.clone(),
            ));
        }

        let permits = Arc::new(Semaphore::new(config.max_connections));
        let settings = ConnectionSettings::from(&config);

        info!(
            device = %device_addr,
            status = ?status_addr,
            max_connections = config.max_connections,
            "tracker server listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = device_listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                            warn!(%peer, limit = config.max_connections, "connection limit reached; rejecting");
                            drop(stream);
                            continue;
                        };

                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%peer, "failed to set TCP_NODELAY: {e}");
                        }

                        let ctx = ConnectionContext::new(peer);
                        info!(conn = %ctx.id, %peer, "device connected");

                        let ingestor = ingestor.clone();
                        let token = shutdown.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            serve_connection(stream, ctx, &ingestor, settings, token).await;
                        });
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        drop(device_listener);
        info!("accept loop stopped; waiting for {} task(s)", tasks.len());
        tasks.close();
        tasks.wait().await;
        info!("tracker server stopped");
    }
}

async fn bind_listener(
    role: &'static str,
    addr: SocketAddr,
) -> Result<(TcpListener, SocketAddr), ServerError> {
    let bind_err = |source| ServerError::Bind { role, addr, source };
    let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
    let local = listener.local_addr().map_err(bind_err)?;
    Ok((listener, local))
}
