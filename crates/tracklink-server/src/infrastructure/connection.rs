//! Per-connection read loop.
//!
//! Each accepted device socket runs [`serve_connection`] in its own task:
//!
//! ```text
//! Accepted ─► Reading ─► (cut frame ─► submit ─► write ack ─► forward)* ─► Closed
//! ```
//!
//! A read may deliver half a frame or several frames; the loop buffers bytes
//! in a [`FrameAssembler`] and processes every complete frame in arrival order
//! before reading again.  The loop ends on EOF, a read or write error, the
//! idle timeout, or shutdown.  Whatever the reason, the connection's registry
//! binding is cleared and the stream is shut down.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tracklink_core::FrameAssembler;

use crate::application::Ingestor;
use crate::domain::{ConnectionContext, ServerConfig};

/// Size of the scratch buffer handed to each `read()`.
const READ_CHUNK: usize = 4096;

/// Limits applied to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub read_timeout: Duration,
    pub max_frame_buffer: usize,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout,
            max_frame_buffer: config.max_frame_buffer,
        }
    }
}

/// Why a connection loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The device closed its side.
    PeerClosed,
    /// Nothing arrived within the read timeout.
    TimedOut,
    ReadFailed(io::ErrorKind),
    WriteFailed(io::ErrorKind),
    /// The server is shutting down.
    Shutdown,
}

/// Serves one device connection until it ends, then cleans up.
pub async fn serve_connection<S>(
    mut stream: S,
    ctx: ConnectionContext,
    ingestor: &Ingestor,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) -> ConnectionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let end = pump(&mut stream, &ctx, ingestor, &settings, &shutdown).await;

    match ingestor.disconnect(&ctx) {
        Some(identity) => {
            info!(conn = %ctx.id, peer = %ctx.peer, identity = %identity, reason = ?end, "device disconnected")
        }
        None => info!(conn = %ctx.id, peer = %ctx.peer, reason = ?end, "connection closed"),
    }

    if let Err(e) = stream.shutdown().await {
        debug!(conn = %ctx.id, "socket shutdown failed: {e}");
    }
    end
}

async fn pump<S>(
    stream: &mut S,
    ctx: &ConnectionContext,
    ingestor: &Ingestor,
    settings: &ConnectionSettings,
    shutdown: &CancellationToken,
) -> ConnectionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut assembler = FrameAssembler::new(settings.max_frame_buffer);
    let mut read_buf = vec![0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return ConnectionEnd::Shutdown,
            res = timeout(settings.read_timeout, stream.read(&mut read_buf)) => match res {
                Err(_) => return ConnectionEnd::TimedOut,
                Ok(Ok(0)) => return ConnectionEnd::PeerClosed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!(conn = %ctx.id, peer = %ctx.peer, "read failed: {e}");
                    return ConnectionEnd::ReadFailed(e.kind());
                }
            },
        };

        if let Err(e) = assembler.push(&read_buf[..n]) {
            warn!(conn = %ctx.id, peer = %ctx.peer, "{e}; buffered bytes discarded");
            continue;
        }

        while let Some(chunk) = assembler.next_chunk() {
            let outcome = ingestor.submit(ctx, &chunk);

            if let Some(reply) = outcome.reply {
                if let Err(e) = stream.write_all(&reply).await {
                    warn!(conn = %ctx.id, peer = %ctx.peer, "writing acknowledgement failed: {e}");
                    return ConnectionEnd::WriteFailed(e.kind());
                }
            }
            if let Some(record) = outcome.record {
                ingestor.forward(record);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio_test::io::Builder;
    use tracklink_core::{build_ack, FrameBuilder, FramePolicy};

    use crate::application::{DeviceRegistry, NullPublisher};
    use crate::infrastructure::fanout::BroadcastPublisher;

    const IMEI: &str = "868204005647838";

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            read_timeout: Duration::from_secs(5),
            max_frame_buffer: 4096,
        }
    }

    fn ctx() -> ConnectionContext {
        ConnectionContext::new(SocketAddr::from(([127, 0, 0, 1], 45000)))
    }

    fn ingestor() -> Ingestor {
        Ingestor::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(NullPublisher),
            FramePolicy::default(),
            true,
        )
    }

    fn frame(altitude: u16) -> Vec<u8> {
        FrameBuilder::data()
            .identity(IMEI)
            .datetime(1_718_000_000)
            .coordinates(51.5, -0.1)
            .altitude(altitude)
            .build()
    }

    #[tokio::test]
    async fn test_frame_is_acknowledged_and_registered() {
        // Arrange
        let frame = frame(10);
        let mock = Builder::new().read(&frame).write(&build_ack(&frame)).build();
        let ingest = ingestor();

        // Act
        let end = serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        // Assert
        assert_eq!(end, ConnectionEnd::PeerClosed);
        let session = ingest.registry().get(IMEI).unwrap();
        assert_eq!(session.record_count, 1);
        assert!(!session.online, "binding must be cleared on close");
    }

    #[tokio::test]
    async fn test_frame_split_across_reads_is_reassembled() {
        let frame = frame(11);
        let (head, tail) = frame.split_at(7);
        let mock = Builder::new()
            .read(head)
            .read(tail)
            .write(&build_ack(&frame))
            .build();
        let ingest = ingestor();

        serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_coalesced_frames_are_acknowledged_in_order() {
        let first = frame(1);
        let second = frame(2);
        let mut both = first.clone();
        both.extend_from_slice(&second);
        let mock = Builder::new()
            .read(&both)
            .write(&build_ack(&first))
            .write(&build_ack(&second))
            .build();
        let ingest = ingestor();

        serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 2);
    }

    #[tokio::test]
    async fn test_corrupt_frame_gets_no_reply_and_connection_continues() {
        let mut bad = frame(3);
        let n = bad.len();
        bad[n - 1] ^= 0xFF;
        let good = frame(4);
        let mock = Builder::new()
            .read(&bad)
            .read(&good)
            .write(&build_ack(&good))
            .build();
        let ingest = ingestor();

        let end = serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(end, ConnectionEnd::PeerClosed);
        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_garbage_before_frame_is_skipped() {
        let good = frame(5);
        let mut stream = vec![0xFF, 0xEE];
        stream.extend_from_slice(&good);
        let mock = Builder::new().read(&stream).write(&build_ack(&good)).build();
        let ingest = ingestor();

        serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(ingest.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_packet_does_not_hold_back_later_frames() {
        // Header 0x08 with a 5-byte body that contains a data header byte.
        let alien = [0x08u8, 0x05, 0x00, 0x10, 0x01, 0xFF, 0x7F, 0x00, 0xAB, 0xCD];
        let good = frame(7);
        let mut builder = Builder::new();
        builder.read(&alien);
        for _ in 0..5 {
            builder.read(&good).write(&build_ack(&good));
        }
        let mock = builder.build();
        let ingest = ingestor();

        let end = serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(end, ConnectionEnd::PeerClosed);
        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 5);
    }

    #[tokio::test]
    async fn test_dangling_header_is_dropped_when_next_frame_arrives() {
        // A lone data header declaring a 32 767-byte body.
        let dangling = [0x01u8, 0xFF, 0x7F];
        let good = frame(8);
        let mock = Builder::new()
            .read(&dangling)
            .read(&good)
            .write(&build_ack(&good))
            .read(&good)
            .write(&build_ack(&good))
            .build();
        let ingest = ingestor();

        serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 2);
    }

    #[tokio::test]
    async fn test_buffer_overflow_discards_and_recovers() {
        // A header declaring a 0x7000-byte body never completes within the cap.
        let oversized = [0x01u8, 0x00, 0x70, 0x00, 0x00, 0x00, 0x00, 0x00];
        let good = frame(6);
        // The read that overflows is discarded together with the buffer.
        let mock = Builder::new()
            .read(&oversized)
            .read(&good)
            .read(&good)
            .write(&build_ack(&good))
            .build();
        let ingest = ingestor();
        let tight = ConnectionSettings {
            max_frame_buffer: good.len() + 4,
            ..settings()
        };

        serve_connection(mock, ctx(), &ingest, tight, CancellationToken::new()).await;

        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_read_error_ends_connection() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let end = serve_connection(mock, ctx(), &ingestor(), settings(), CancellationToken::new()).await;

        assert_eq!(end, ConnectionEnd::ReadFailed(io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        let (server_side, _device_side) = tokio::io::duplex(1024);
        let quick = ConnectionSettings {
            read_timeout: Duration::from_millis(50),
            ..settings()
        };

        let end = serve_connection(server_side, ctx(), &ingestor(), quick, CancellationToken::new()).await;

        assert_eq!(end, ConnectionEnd::TimedOut);
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_pending_read() {
        let (server_side, mut device_side) = tokio::io::duplex(1024);
        let ingest = ingestor();
        let token = CancellationToken::new();

        // Send one frame so the connection is bound before shutdown.
        let frame = frame(7);
        device_side.write_all(&frame).await.unwrap();

        let task = {
            let ingest = ingest.clone();
            let token = token.clone();
            let ctx = ctx();
            tokio::spawn(async move { serve_connection(server_side, ctx, &ingest, settings(), token).await })
        };

        let mut ack = [0u8; 3];
        device_side.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, build_ack(&frame));

        token.cancel();
        let end = task.await.unwrap();

        assert_eq!(end, ConnectionEnd::Shutdown);
        assert!(!ingest.registry().get(IMEI).unwrap().online);
        // The server side was shut down, so the device sees EOF.
        let mut rest = Vec::new();
        device_side.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_record_is_forwarded_after_ack() {
        let registry = Arc::new(DeviceRegistry::new());
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let ingest = Ingestor::new(registry, Arc::new(publisher), FramePolicy::default(), true);
        let frame = frame(8);
        let mock = Builder::new().read(&frame).write(&build_ack(&frame)).build();

        serve_connection(mock, ctx(), &ingest, settings(), CancellationToken::new()).await;

        let record = rx.recv().await.unwrap();
        assert_eq!(record.altitude_m, Some(8));
    }
}
