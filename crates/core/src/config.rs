//! Configuration management for the ResilIoT base station.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::types::NodeId;

/// Well-known UDP port for alert broadcasts.
pub const DEFAULT_BROADCAST_PORT: u16 = 5005;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Radio address of this receiver; frames for other destinations are discarded.
    #[serde(default = "default_address")]
    pub address: NodeId,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Pre-shared key as 64 hex characters.
    #[serde(default)]
    pub psk_hex: Option<String>,
    /// Alternatively, a file holding the raw 32-byte key.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Durable nonce counter. Must not be shared by two running processes.
    #[serde(default = "default_counter_path")]
    pub counter_path: PathBuf,
}

impl fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("psk_hex", &self.psk_hex.as_ref().map(|_| "<redacted>"))
            .field("key_file", &self.key_file)
            .field("counter_path", &self.counter_path)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_thresholds_path")]
    pub thresholds_path: PathBuf,
    /// Upper bound on how long a store call may wait for the database lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Local address the radio daemon forwards received frames to.
    #[serde(default = "default_radio_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_address")]
    pub address: Ipv4Addr,
    #[serde(default = "default_broadcast_port")]
    pub port: u16,
    /// Network device to bind to; failure to bind falls back to default routing.
    #[serde(default = "default_interface")]
    pub interface: Option<String>,
    #[serde(default = "default_send_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            psk_hex: None,
            key_file: None,
            counter_path: default_counter_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            thresholds_path: default_thresholds_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            listen: default_radio_listen(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            address: default_broadcast_address(),
            port: default_broadcast_port(),
            interface: default_interface(),
            timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl BroadcastConfig {
    pub fn target(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_address() -> NodeId {
    NodeId::BASE_STATION
}

fn default_counter_path() -> PathBuf {
    expand_home(Path::new("~/.resiliot_nonce_counter"))
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db/sensor_data.db")
}

fn default_thresholds_path() -> PathBuf {
    PathBuf::from("db/thresholds.json")
}

fn default_busy_timeout_ms() -> u64 {
    250
}

fn default_radio_listen() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5600))
}

fn default_max_frame_len() -> usize {
    // SX127x FIFO size
    256
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_interface() -> Option<String> {
    Some("wlan0".to_string())
}

fn default_send_timeout_ms() -> u64 {
    1000
}

fn default_interval_secs() -> u64 {
    60
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.crypto.counter_path = expand_home(&config.crypto.counter_path);
        if let Some(key_file) = config.crypto.key_file.take() {
            config.crypto.key_file = Some(expand_home(&key_file));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            node: NodeConfig::default(),
            crypto: CryptoConfig::default(),
            storage: StorageConfig::default(),
            radio: RadioConfig::default(),
            broadcast: BroadcastConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        match (&self.crypto.psk_hex, &self.crypto.key_file) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "crypto.psk_hex and crypto.key_file are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(
                    "one of crypto.psk_hex or crypto.key_file is required".to_string(),
                ))
            }
            _ => {}
        }
        if self.broadcast.port == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.port must be non-zero".to_string(),
            ));
        }
        if self.broadcast.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.alerts.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "alerts.interval_secs must be non-zero".to_string(),
            ));
        }
        if self.radio.max_frame_len == 0 {
            return Err(ConfigError::ValidationError(
                "radio.max_frame_len must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::V4(self.broadcast.target())
    }

    pub fn send_timeout(&self) -> Duration {
        self.broadcast.timeout()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alerts.interval_secs)
    }
}

/// Expand a leading `~/` using `$HOME`. Paths without it are returned as-is.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
