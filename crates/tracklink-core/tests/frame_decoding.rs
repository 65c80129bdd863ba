//! Integration tests for the tracklink-core frame pipeline.
//!
//! Each test drives bytes through the public API the same way the server
//! does: cut, validate, decode, acknowledge.

use chrono::{TimeZone, Utc};
use tracklink_core::{
    build_ack, checksum16, decode, decode_frame, validate, validate_with, FrameAssembler,
    FrameBuilder, FrameError, FramePolicy, Validated, ACK_MARKER,
};

const IMEI: &str = "868204005647838";

/// Validates `bytes` and returns the decoded record, panicking on anything
/// other than a data frame.
fn decode_data(bytes: &[u8]) -> tracklink_core::DecodedRecord {
    match validate(bytes).expect("frame must validate") {
        Validated::Data(frame) => decode_frame(&frame),
        Validated::Ignorable(_) => panic!("expected a data frame"),
    }
}

fn body_len(bytes: &[u8]) -> usize {
    usize::from(u16::from_le_bytes([bytes[1], bytes[2]]) & 0x7FFF)
}

#[test]
fn test_checksum_is_deterministic_and_matches_reference() {
    let data = b"123456789";
    let first = checksum16(data, 0, data.len());
    let second = checksum16(data, 0, data.len());
    assert_eq!(first, second);
    assert_eq!(first, 0x4B37);
}

#[test]
fn test_buffers_under_three_bytes_are_rejected() {
    assert_eq!(validate(&[]), Err(FrameError::TooShort(0)));
    assert_eq!(validate(&[0x01]), Err(FrameError::TooShort(1)));
    assert_eq!(validate(&[0x01, 0x00]), Err(FrameError::TooShort(2)));
}

#[test]
fn test_declared_length_beyond_buffer_is_rejected() {
    // Arrange: header says 40 body bytes, only 10 follow.
    let mut bytes = vec![0x01, 40, 0x00];
    bytes.extend_from_slice(&[0u8; 10]);

    // Act / Assert
    assert_eq!(
        validate(&bytes),
        Err(FrameError::Incomplete {
            expected: 45,
            available: 13,
        })
    );
}

#[test]
fn test_small_body_accepts_wrong_checksum() {
    let mut bytes = FrameBuilder::data().altitude(300).hdop(2).build();
    assert!(body_len(&bytes) < 32);
    let n = bytes.len();
    bytes[n - 2] ^= 0x5A;
    bytes[n - 1] ^= 0xA5;

    let record = decode_data(&bytes);
    assert_eq!(record.altitude_m, Some(300));
}

#[test]
fn test_large_body_rejects_wrong_checksum() {
    let mut bytes = FrameBuilder::data()
        .identity(IMEI)
        .datetime(1_700_000_000)
        .coordinates(1.0, 2.0)
        .altitude(10)
        .build();
    assert!(body_len(&bytes) >= 32);
    let n = bytes.len();
    bytes[n - 1] ^= 0x01;

    assert!(matches!(
        validate(&bytes),
        Err(FrameError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_raising_threshold_bypasses_checksum_for_large_body() {
    let mut bytes = FrameBuilder::data()
        .identity(IMEI)
        .datetime(1_700_000_000)
        .coordinates(1.0, 2.0)
        .altitude(10)
        .build();
    let n = bytes.len();
    bytes[n - 1] ^= 0x01;

    let lenient = FramePolicy {
        checksum_threshold: 1024,
    };
    assert!(matches!(
        validate_with(&bytes, &lenient),
        Ok(Validated::Data(_))
    ));
}

#[test]
fn test_coordinates_survive_encode_and_decode() {
    let bytes = FrameBuilder::data().coordinates(51.123456, -0.654321).build();
    let record = decode_data(&bytes);

    assert_eq!(format!("{:.6}", record.latitude.unwrap()), "51.123456");
    assert_eq!(format!("{:.6}", record.longitude.unwrap()), "-0.654321");
}

#[test]
fn test_speed_and_heading_scale_by_ten() {
    let bytes = FrameBuilder::data().speed_heading(125, 900).build();
    let record = decode_data(&bytes);

    assert_eq!(record.speed_kmh, Some(12.5));
    assert_eq!(record.heading_deg, Some(90.0));
}

#[test]
fn test_unknown_tag_is_skipped_without_losing_later_fields() {
    let bytes = FrameBuilder::data()
        .altitude(42)
        .raw(&[0x99])
        .status(0x0003)
        .build();
    let record = decode_data(&bytes);

    assert_eq!(record.altitude_m, Some(42));
    assert_eq!(record.status, Some(0x0003));
}

#[test]
fn test_full_data_frame_decodes_and_acknowledges() {
    // Arrange
    let bytes = FrameBuilder::data()
        .identity(IMEI)
        .datetime(1_718_000_000)
        .coordinates(55.751244, 37.618423)
        .speed_heading(600, 1800)
        .supply_voltage(12_600)
        .battery_voltage(4_100)
        .build();
    assert!(body_len(&bytes) >= 32);

    // Act
    let record = decode_data(&bytes);
    let ack = build_ack(&bytes);

    // Assert
    assert_eq!(record.identity.as_deref(), Some(IMEI));
    assert_eq!(
        record.timestamp,
        Some(Utc.timestamp_opt(1_718_000_000, 0).unwrap())
    );
    assert_eq!(format!("{:.6}", record.latitude.unwrap()), "55.751244");
    assert_eq!(format!("{:.6}", record.longitude.unwrap()), "37.618423");
    assert_eq!(record.speed_kmh, Some(60.0));
    assert_eq!(record.heading_deg, Some(180.0));
    assert_eq!(record.supply_voltage, Some(12.6));
    assert_eq!(record.battery_voltage, Some(4.1));
    assert!(!record.has_unsent_archive);
    assert_eq!(ack, [ACK_MARKER, bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
}

#[test]
fn test_archive_flag_reaches_record() {
    let bytes = FrameBuilder::data()
        .archive_count(17)
        .archive_pending(true)
        .build();
    let record = decode_data(&bytes);

    assert!(record.has_unsent_archive);
    assert_eq!(record.archive_count, Some(17));
}

#[test]
fn test_ignorable_packet_is_never_decoded() {
    let bytes = FrameBuilder::ignorable().raw(&[0x03, b'x']).build();

    match validate(&bytes) {
        Ok(Validated::Ignorable(raw)) => assert_eq!(raw, bytes.as_slice()),
        other => panic!("expected ignorable packet, got {other:?}"),
    }
}

#[test]
fn test_truncated_tag_returns_partial_record() {
    // Body ends in the middle of a coordinates value.
    let body = [0x34, 0x64, 0x00, 0x30, 0x01, 0x02, 0x03];
    let record = decode(&body);

    assert_eq!(record.altitude_m, Some(100));
    assert!(!record.has_position());
}

#[test]
fn test_assembler_feeds_split_and_coalesced_frames_to_validator() {
    let a = FrameBuilder::data().identity(IMEI).hdop(5).build();
    let b = FrameBuilder::ignorable().build();
    let c = FrameBuilder::data().identity(IMEI).altitude(9).build();
    let mut stream = a.clone();
    stream.extend_from_slice(&b);
    stream.extend_from_slice(&c);

    // Deliver the stream in uneven reads.
    let mut assembler = FrameAssembler::new(4096);
    let mut chunks = Vec::new();
    for piece in stream.chunks(7) {
        assembler.push(piece).unwrap();
        while let Some(chunk) = assembler.next_chunk() {
            chunks.push(chunk);
        }
    }

    assert_eq!(chunks, vec![a, b, c]);
    assert!(matches!(validate(&chunks[1]), Ok(Validated::Ignorable(_))));
    assert_eq!(decode_data(&chunks[2]).altitude_m, Some(9));
}

#[test]
fn test_record_serializes_to_camel_case_json() {
    let bytes = FrameBuilder::data()
        .identity(IMEI)
        .input_voltage(0, 5_000)
        .user_data(1, 77)
        .build();
    let record = decode_data(&bytes);
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["identity"], IMEI);
    assert_eq!(json["hasUnsentArchive"], false);
    assert_eq!(json["extensions"]["inputVoltage0"], 5.0);
    assert_eq!(json["extensions"]["userData1"], 77);
}
