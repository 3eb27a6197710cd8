//! Sensor frame to alert broadcast, through the production components

use std::collections::HashSet;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, TimeZone, Utc};
use resiliot_alerts::AlertEngine;
use resiliot_core::{AlertLevel, NodeId};
use resiliot_crypto::{AeadEnvelope, NonceBuilder, NonceCounter, PersistentCounter, NONCE_SIZE};
use resiliot_radio::{
    run_receive_loop, BroadcastOutcome, BroadcastSender, FrameOutcome, Ingestor, UdpFrameSource,
};
use resiliot_telemetry::{
    Forecast, ForecastStore, PacketValidator, ReadingStore, SqliteStore,
};

use crate::test_utils::*;

fn open_store(path: &std::path::Path) -> SqliteStore {
    SqliteStore::open(path, Duration::from_millis(250)).unwrap()
}

#[test]
fn test_river_flood_frame_raises_high_alert_broadcast() {
    let db_path = temp_path("sensor_data.db");
    let river_node = TestSensorNode::new(NodeId::RIVER);

    // Receive path
    let mut ingestor = Ingestor::new(
        AeadEnvelope::new(&test_key()),
        PacketValidator::new(NodeId::BASE_STATION),
        open_store(&db_path),
    );
    let received_at = Utc.with_ymd_and_hms(2025, 12, 1, 6, 0, 0).unwrap();
    assert_eq!(
        ingestor.on_frame_at(&river_node.frame("240,12.5,0"), received_at),
        FrameOutcome::Stored
    );

    // Alert path on its own connection
    let alert_store = open_store(&db_path);
    let listener = AlertListener::bind();
    let counter_path = db_path.with_file_name("nonce_counter");
    let sender = BroadcastSender::new(
        AeadEnvelope::new(&test_key()),
        NonceBuilder::new(PersistentCounter::new(&counter_path)),
        listener.sink(),
    );

    let mut thresholds = field_thresholds();
    thresholds.high.river_max = 230.0;
    let engine = AlertEngine::new(thresholds);
    let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();

    let evaluation = engine.evaluate(&alert_store, &alert_store, date).unwrap();
    assert_eq!(evaluation.level, AlertLevel::High);
    assert_eq!(evaluation.snapshot.river, 240.0);

    let outcome = sender.send(evaluation.level).unwrap();
    assert!(matches!(outcome, BroadcastOutcome::Sent { .. }));
    assert_eq!(listener.recv_alert(), "High");

    cleanup(&db_path);
}

#[test]
fn test_soil_and_forecast_combine_into_mid_alert() {
    let db_path = temp_path("sensor_data.db");
    let soil_node = TestSensorNode::new(NodeId::SOIL_WEATHER);
    let mut store = open_store(&db_path);

    let date = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
    store
        .upsert_forecast(&Forecast::from_daily(date, 6.0, 13.0, 80, 4.0))
        .unwrap();

    let mut ingestor = Ingestor::new(
        AeadEnvelope::new(&test_key()),
        PacketValidator::new(NodeId::BASE_STATION),
        store,
    );
    let received_at = Utc.with_ymd_and_hms(2025, 4, 9, 14, 0, 0).unwrap();
    assert_eq!(
        ingestor.on_frame_at(&soil_node.frame("12.0,88,45,0.5,6.5"), received_at),
        FrameOutcome::Stored
    );
    let store = ingestor.into_store();

    // High soil floor above the reading so only the Mid band applies
    let mut thresholds = field_thresholds();
    thresholds.high.soil_min = 60.0;
    let evaluation = AlertEngine::new(thresholds)
        .evaluate(&store, &store, date)
        .unwrap();

    assert_eq!(evaluation.level, AlertLevel::Mid);
    assert_eq!(evaluation.snapshot.soil, 45.0);
    assert_eq!(evaluation.snapshot.total_rain, 6.5);

    cleanup(&db_path);
}

#[test]
fn test_receive_loop_over_udp() {
    init_test_logging();
    let db_path = temp_path("sensor_data.db");
    let mut source = UdpFrameSource::bind("127.0.0.1:0".parse().unwrap(), 256).unwrap();
    let radio_addr = source.local_addr().unwrap();

    let mut ingestor = Ingestor::new(
        AeadEnvelope::new(&test_key()),
        PacketValidator::new(NodeId::BASE_STATION),
        open_store(&db_path),
    );
    let shutdown = Arc::new(AtomicBool::new(false));
    let loop_shutdown = Arc::clone(&shutdown);
    let receiver = thread::spawn(move || {
        let stats = run_receive_loop(&mut source, &mut ingestor, &loop_shutdown);
        (stats, ingestor)
    });

    let radio = UdpSocket::bind("127.0.0.1:0").unwrap();
    let river_node = TestSensorNode::new(NodeId::RIVER);
    let soil_node = TestSensorNode::new(NodeId::SOIL_WEATHER);
    radio.send_to(&river_node.frame("55,0.5,0"), radio_addr).unwrap();
    radio.send_to(&soil_node.frame("19,70,33,0,1.2"), radio_addr).unwrap();
    radio.send_to(&[0xAB; 8], radio_addr).unwrap();

    // Poll a separate connection until both readings are visible
    let observer = open_store(&db_path);
    let deadline = Instant::now() + Duration::from_secs(5);
    while observer.count().unwrap() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    // Let the junk frame drain too
    thread::sleep(Duration::from_millis(100));

    shutdown.store(true, Ordering::Relaxed);
    let (stats, ingestor) = receiver.join().unwrap();

    assert_eq!(stats.stored, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(ingestor.stats(), stats);
    assert!(observer.latest(NodeId::RIVER).unwrap().is_some());
    assert!(observer.latest(NodeId::SOIL_WEATHER).unwrap().is_some());

    cleanup(&db_path);
}

#[test]
fn test_nonces_unique_across_restarts() {
    let counter_path = temp_path("nonce_counter");
    let sink = RecordingSink::default();

    for _restart in 0..3 {
        let sender = BroadcastSender::new(
            AeadEnvelope::new(&test_key()),
            NonceBuilder::new(PersistentCounter::new(&counter_path)),
            &sink,
        );
        for _ in 0..4 {
            sender.send(AlertLevel::Low).unwrap();
        }
    }

    let sent = sink.take();
    assert_eq!(sent.len(), 12);

    let nonces: HashSet<&[u8]> = sent.iter().map(|d| &d[..NONCE_SIZE]).collect();
    assert_eq!(nonces.len(), 12);

    // Counter halves run on consecutively from the first seeded value
    let counters: Vec<u64> = sent
        .iter()
        .map(|d| u64::from_be_bytes(d[4..NONCE_SIZE].try_into().unwrap()))
        .collect();
    for pair in counters.windows(2) {
        assert_eq!(pair[1], pair[0].wrapping_add(1));
    }

    let resumed = PersistentCounter::new(&counter_path).take_next().unwrap();
    assert_eq!(resumed, counters[11].wrapping_add(1));

    for datagram in &sent {
        let plaintext = AeadEnvelope::new(&test_key()).decode(datagram).unwrap();
        assert_eq!(plaintext, b"Low");
    }

    cleanup(&counter_path);
}

#[tokio::test]
async fn test_alert_cycle_in_blocking_task() {
    let db_path = temp_path("sensor_data.db");
    let listener = AlertListener::bind();
    let sink = listener.sink();
    let path = db_path.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let store = open_store(&path);
        let sender = BroadcastSender::new(
            AeadEnvelope::new(&test_key()),
            NonceBuilder::new(PersistentCounter::new(path.with_file_name("counter"))),
            sink,
        );
        let today = Local::now().date_naive();
        let evaluation = AlertEngine::new(field_thresholds())
            .evaluate(&store, &store, today)
            .unwrap();
        sender.send(evaluation.level).unwrap()
    })
    .await
    .unwrap();

    assert!(matches!(outcome, BroadcastOutcome::Sent { .. }));
    assert_eq!(listener.recv_alert(), "None");

    cleanup(&db_path);
}
