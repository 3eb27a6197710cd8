//! Core functionality for the ResilIoT flood-monitoring base station.
//!
//! This crate provides the fundamental types, configuration and logging
//! setup shared by the crypto, telemetry, alerting and radio crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    AlertsConfig, BroadcastConfig, Config, CryptoConfig, NodeConfig, RadioConfig, StorageConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::{
    format_timestamp, parse_timestamp, unix_seconds, AlertLevel, NodeId, UnknownAlertLevel,
    TIMESTAMP_FORMAT,
};
