//! Frames an attacker or a faulty node could put on the air
//!
//! None of these may produce a stored reading, and none may stop the
//! receiver from accepting the next good frame.

use chrono::{TimeZone, Utc};
use resiliot_core::NodeId;
use resiliot_crypto::{AeadEnvelope, MemoryCounter, NonceBuilder, SharedKey, MIN_ENVELOPE_LEN};
use resiliot_radio::{DropReason, FrameOutcome, IngestStats, Ingestor};
use resiliot_telemetry::{MemoryStore, PacketValidator, ReadingStore};

use crate::test_utils::*;

fn base_station() -> Ingestor<MemoryStore> {
    Ingestor::new(
        AeadEnvelope::new(&test_key()),
        PacketValidator::new(NodeId::BASE_STATION),
        MemoryStore::new(),
    )
}

fn at(second: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 30, 22, 10, second).unwrap()
}

#[test]
fn test_spoofed_key_rejected() {
    let mut station = base_station();
    let rogue = AeadEnvelope::new(&SharedKey::generate())
        .encode(
            &NonceBuilder::new(MemoryCounter::new(0)),
            b"\x01\x03249,250,1",
        )
        .unwrap();

    assert_eq!(
        station.on_frame_at(&rogue, at(0)),
        FrameOutcome::Dropped(DropReason::Envelope)
    );
    assert!(station.store().is_empty());
}

#[test]
fn test_every_truncation_rejected() {
    let mut station = base_station();
    let frame = TestSensorNode::new(NodeId::RIVER).frame("10,0,0");

    for len in 0..frame.len() {
        let outcome = station.on_frame_at(&frame[..len], at(1));
        assert_eq!(outcome, FrameOutcome::Dropped(DropReason::Envelope), "len {len}");
    }
    assert!(station.store().is_empty());
    assert!(frame.len() > MIN_ENVELOPE_LEN);
}

#[test]
fn test_authentic_but_malformed_payloads_rejected() {
    init_test_logging();
    let mut station = base_station();
    let river = TestSensorNode::new(NodeId::RIVER);
    let soil = TestSensorNode::new(NodeId::SOIL_WEATHER);
    let stranger = TestSensorNode::new(NodeId(9));

    let hostile = [
        river.frame("10,0"),
        river.frame("10,0,0,0"),
        river.frame("-1,0,0"),
        river.frame("10,0,2"),
        river.frame("10,nan,0"),
        soil.frame("51,50,50,0,0"),
        soil.frame("20,50,50,0,301"),
        soil.frame("20;50;50;0;0"),
        stranger.frame("1,2,3"),
    ];

    for (i, frame) in hostile.iter().enumerate() {
        assert_eq!(
            station.on_frame_at(frame, at(i as u32)),
            FrameOutcome::Dropped(DropReason::Packet),
            "payload {i}"
        );
    }
    assert!(station.store().is_empty());

    // The receiver still accepts the next good frame
    assert_eq!(
        station.on_frame_at(&river.frame("10,0,0"), at(30)),
        FrameOutcome::Stored
    );
    assert_eq!(
        station.stats(),
        IngestStats {
            stored: 1,
            duplicate: 0,
            discarded: 0,
            dropped: hostile.len() as u64,
        }
    );
}

#[test]
fn test_frames_for_other_receivers_are_discarded() {
    let mut station = base_station();
    let river = TestSensorNode::new(NodeId::RIVER);

    let outcome = station.on_frame_at(&river.frame_to(NodeId(0x02), "10,0,0"), at(0));
    assert_eq!(outcome, FrameOutcome::Discarded);
    assert!(station.store().latest(NodeId::RIVER).unwrap().is_none());
}

#[test]
fn test_replayed_frame_in_same_second_is_duplicate() {
    let mut station = base_station();
    let frame = TestSensorNode::new(NodeId::RIVER).frame("80,1,0");

    assert_eq!(station.on_frame_at(&frame, at(5)), FrameOutcome::Stored);
    assert_eq!(station.on_frame_at(&frame, at(5)), FrameOutcome::Duplicate);
    assert_eq!(station.store().len(), 1);
}
