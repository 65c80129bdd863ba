//! Ingest pipeline: one candidate frame in, record and reply out.
//!
//! This is the transport-free half of a connection.  The socket loop in
//! `infrastructure::connection` cuts frames and writes replies; everything
//! between those two steps happens here:
//!
//! ```text
//! frame bytes ─► validate ─┬─ Data ──────► decode ─► registry ─► ack
//!                          ├─ Ignorable ─────────────────────► ack (policy)
//!                          └─ error ─────► drop (logged, no reply)
//! ```
//!
//! Publishing is a separate step ([`Ingestor::forward`]) so the caller can
//! write the acknowledgement first.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use tracklink_core::{build_ack, decode_frame, validate_with, DecodedRecord, FrameError, FramePolicy, Validated};

use crate::application::publisher::RecordPublisher;
use crate::application::registry::DeviceRegistry;
use crate::domain::{ConnectionContext, ServerConfig};

/// Result of submitting one candidate frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    /// The decoded record, for data frames.
    pub record: Option<Arc<DecodedRecord>>,
    /// Bytes to write back to the device.
    pub reply: Option<[u8; 3]>,
    /// Why the frame was dropped, if it was.
    pub dropped: Option<FrameError>,
}

/// Shared, cheap-to-clone handle on the ingest pipeline.
#[derive(Clone)]
pub struct Ingestor {
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn RecordPublisher>,
    policy: FramePolicy,
    ack_ignorable: bool,
}

impl Ingestor {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn RecordPublisher>,
        policy: FramePolicy,
        ack_ignorable: bool,
    ) -> Self {
        Self {
            registry,
            publisher,
            policy,
            ack_ignorable,
        }
    }

    /// Builds an ingestor with the frame rules from `config`.
    pub fn from_config(
        config: &ServerConfig,
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn RecordPublisher>,
    ) -> Self {
        Self::new(registry, publisher, config.frame_policy, config.ack_ignorable)
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Validates and decodes one candidate frame received on `ctx`.
    ///
    /// Data frames that carry an identity update the registry and bind the
    /// connection to that identity.  Invalid frames produce no reply.
    pub fn submit(&self, ctx: &ConnectionContext, frame: &[u8]) -> IngestOutcome {
        trace!(conn = %ctx.id, peer = %ctx.peer, frame = %Hex(frame), "candidate frame");

        let validated = match validate_with(frame, &self.policy) {
            Ok(v) => v,
            Err(err) => {
                match err {
                    FrameError::ChecksumMismatch { .. } => {
                        warn!(conn = %ctx.id, peer = %ctx.peer, "dropping frame: {err}")
                    }
                    _ => debug!(conn = %ctx.id, peer = %ctx.peer, "dropping frame: {err}"),
                }
                return IngestOutcome {
                    dropped: Some(err),
                    ..Default::default()
                };
            }
        };

        match validated {
            Validated::Ignorable(bytes) => {
                debug!(conn = %ctx.id, peer = %ctx.peer, len = bytes.len(), "ignorable packet");
                IngestOutcome {
                    reply: self.ack_ignorable.then(|| build_ack(bytes)),
                    ..Default::default()
                }
            }
            Validated::Data(data) => {
                let record = decode_frame(&data);
                if let Some(identity) = record.identity.as_deref() {
                    let count = self.registry.observe(identity, ctx.peer, &record);
                    if self.registry.bind(ctx.id, identity) {
                        debug!(conn = %ctx.id, peer = %ctx.peer, identity, "identity revealed");
                    }
                    debug!(conn = %ctx.id, identity, records = count, "record decoded");
                } else {
                    debug!(conn = %ctx.id, peer = %ctx.peer, "record decoded without identity");
                }
                IngestOutcome {
                    record: Some(Arc::new(record)),
                    reply: Some(build_ack(data.bytes())),
                    dropped: None,
                }
            }
        }
    }

    /// Hands a decoded record to the publisher.
    pub fn forward(&self, record: Arc<DecodedRecord>) {
        self.publisher.publish(record);
    }

    /// Clears the binding of a closed connection.
    pub fn disconnect(&self, ctx: &ConnectionContext) -> Option<String> {
        self.registry.unbind(ctx.id)
    }
}

/// Lowercase hex rendering for trace logs.
pub(crate) struct Hex<'a>(pub &'a [u8]);

impl std::fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::publisher::MockRecordPublisher;
    use std::net::SocketAddr;
    use tracklink_core::{FrameBuilder, ACK_MARKER};

    const IMEI: &str = "868204005647838";

    fn ctx() -> ConnectionContext {
        ConnectionContext::new(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    fn ingestor(publisher: MockRecordPublisher) -> Ingestor {
        Ingestor::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(publisher),
            FramePolicy::default(),
            true,
        )
    }

    fn full_frame() -> Vec<u8> {
        FrameBuilder::data()
            .identity(IMEI)
            .datetime(1_718_000_000)
            .coordinates(51.123456, -0.654321)
            .altitude(12)
            .build()
    }

    #[test]
    fn test_submit_data_frame_updates_registry_and_acks() {
        // Arrange
        let ingest = ingestor(MockRecordPublisher::new());
        let ctx = ctx();
        let frame = full_frame();

        // Act
        let outcome = ingest.submit(&ctx, &frame);

        // Assert
        let record = outcome.record.expect("record expected");
        assert_eq!(record.identity.as_deref(), Some(IMEI));
        assert_eq!(
            outcome.reply,
            Some([ACK_MARKER, frame[frame.len() - 2], frame[frame.len() - 1]])
        );
        assert_eq!(outcome.dropped, None);
        assert_eq!(ingest.registry().get(IMEI).unwrap().record_count, 1);
        assert_eq!(ingest.registry().binding(ctx.id).as_deref(), Some(IMEI));
    }

    #[test]
    fn test_submit_frame_without_identity_skips_registry() {
        let ingest = ingestor(MockRecordPublisher::new());
        let frame = FrameBuilder::data().speed_heading(10, 20).build();

        let outcome = ingest.submit(&ctx(), &frame);

        assert!(outcome.record.is_some());
        assert!(outcome.reply.is_some());
        assert!(ingest.registry().is_empty());
    }

    #[test]
    fn test_submit_bad_checksum_is_dropped_without_reply() {
        let ingest = ingestor(MockRecordPublisher::new());
        let mut frame = full_frame();
        let n = frame.len();
        frame[n - 1] ^= 0xFF;

        let outcome = ingest.submit(&ctx(), &frame);

        assert!(matches!(outcome.dropped, Some(FrameError::ChecksumMismatch { .. })));
        assert_eq!(outcome.reply, None);
        assert_eq!(outcome.record, None);
        assert!(ingest.registry().is_empty());
    }

    #[test]
    fn test_submit_unknown_header_is_dropped() {
        let ingest = ingestor(MockRecordPublisher::new());
        let outcome = ingest.submit(&ctx(), &[0x42, 0x00, 0x00]);
        assert_eq!(outcome.dropped, Some(FrameError::UnknownPacketType(0x42)));
        assert_eq!(outcome.reply, None);
    }

    #[test]
    fn test_submit_ignorable_acks_without_record() {
        let ingest = ingestor(MockRecordPublisher::new());
        let frame = FrameBuilder::ignorable().build();

        let outcome = ingest.submit(&ctx(), &frame);

        assert_eq!(outcome.record, None);
        assert_eq!(outcome.reply, Some(build_ack(&frame)));
        assert!(ingest.registry().is_empty());
    }

    #[test]
    fn test_submit_ignorable_without_ack_policy() {
        let ingest = Ingestor::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(MockRecordPublisher::new()),
            FramePolicy::default(),
            false,
        );
        let outcome = ingest.submit(&ctx(), &FrameBuilder::ignorable().build());
        assert_eq!(outcome, IngestOutcome::default());
    }

    #[test]
    fn test_forward_publishes_exactly_once() {
        let mut publisher = MockRecordPublisher::new();
        publisher
            .expect_publish()
            .withf(|record| record.identity.as_deref() == Some(IMEI))
            .times(1)
            .return_const(());
        let ingest = ingestor(publisher);

        let outcome = ingest.submit(&ctx(), &full_frame());
        ingest.forward(outcome.record.unwrap());
    }

    #[test]
    fn test_disconnect_clears_binding() {
        let ingest = ingestor(MockRecordPublisher::new());
        let ctx = ctx();
        ingest.submit(&ctx, &full_frame());

        assert_eq!(ingest.disconnect(&ctx).as_deref(), Some(IMEI));
        assert!(!ingest.registry().get(IMEI).unwrap().online);
        assert_eq!(ingest.disconnect(&ctx), None);
    }

    #[test]
    fn test_hex_renders_lowercase_pairs() {
        assert_eq!(Hex(&[0x01, 0xAB, 0x00]).to_string(), "01ab00");
    }
}
