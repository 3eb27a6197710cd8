//! Shared fixtures for the integration tests

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use resiliot_alerts::ThresholdSet;
use resiliot_core::NodeId;
use resiliot_crypto::{AeadEnvelope, MemoryCounter, NonceBuilder, SharedKey};
use resiliot_radio::{BroadcastError, DatagramSink, UdpBroadcast};

/// Key provisioned on every node in the test deployment.
pub const TEST_PSK_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub fn test_key() -> SharedKey {
    SharedKey::from_hex(TEST_PSK_HEX).expect("test key is valid hex")
}

/// Route logs from the components under test through the test harness.
///
/// Set `RUST_LOG=debug` to see every frame a test pushes through.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh path under the system temp directory.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("resiliot_it_{}", uuid::Uuid::new_v4()))
        .join(name)
}

/// Remove the per-test directory created by [`temp_path`].
pub fn cleanup(path: &std::path::Path) {
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

/// Thresholds used across the end-to-end scenarios.
pub fn field_thresholds() -> ThresholdSet {
    ThresholdSet::from_json(
        r#"{
            "Low": {"river_max": 100, "soil_min": 10, "soil_max": 50},
            "Mid": {"river_max": 200, "soil_min": 5, "soil_max": 60, "rain_thresh": 3},
            "High": {"river_max": 300, "soil_min": 0, "soil_max": 70, "rain_thresh": 5}
        }"#,
    )
    .expect("fixture thresholds are valid")
}

/// A remote sensor node sealing readings the way the field firmware does.
pub struct TestSensorNode {
    pub id: NodeId,
    envelope: AeadEnvelope,
    nonces: NonceBuilder<MemoryCounter>,
}

impl TestSensorNode {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            envelope: AeadEnvelope::new(&test_key()),
            nonces: NonceBuilder::new(MemoryCounter::seeded().expect("OS entropy")),
        }
    }

    /// Seal `csv` addressed to `dest`.
    pub fn frame_to(&self, dest: NodeId, csv: &str) -> Vec<u8> {
        let mut plaintext = vec![dest.as_u8(), self.id.as_u8()];
        plaintext.extend_from_slice(csv.as_bytes());
        self.envelope
            .encode(&self.nonces, &plaintext)
            .expect("memory counter never fails")
    }

    /// Seal `csv` addressed to the base station.
    pub fn frame(&self, csv: &str) -> Vec<u8> {
        self.frame_to(NodeId::BASE_STATION, csv)
    }
}

/// A socket standing in for a field display listening for alert broadcasts.
pub struct AlertListener {
    socket: UdpSocket,
}

impl AlertListener {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind loopback");
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("set timeout");
        Self { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("local addr")
    }

    /// Sink that sends to this listener instead of the broadcast address.
    pub fn sink(&self) -> UdpBroadcast {
        UdpBroadcast::new(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.addr().port()),
            None,
            Duration::from_secs(1),
        )
    }

    /// Next datagram, decrypted with the test key.
    pub fn recv_alert(&self) -> String {
        let mut buf = [0u8; 256];
        let (len, _) = self.socket.recv_from(&mut buf).expect("alert datagram");
        let plaintext = AeadEnvelope::new(&test_key())
            .decode(&buf[..len])
            .expect("alert authenticates");
        String::from_utf8(plaintext).expect("alert text is UTF-8")
    }
}

/// Sink that keeps every datagram in memory.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DatagramSink for RecordingSink {
    fn send_datagram(&self, payload: &[u8]) -> Result<usize, BroadcastError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.to_vec());
        Ok(payload.len())
    }
}
