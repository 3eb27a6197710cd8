//! Core types shared across the telemetry path.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Storage and display format for reading timestamps (second precision, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One-byte radio address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u8);

impl NodeId {
    /// Base station (this receiver in the default deployment)
    pub const BASE_STATION: NodeId = NodeId(0x01);
    /// Soil moisture / weather node
    pub const SOIL_WEATHER: NodeId = NodeId(0x02);
    /// River level node
    pub const RIVER: NodeId = NodeId(0x03);

    /// Raw address byte.
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for NodeId {
    fn from(value: u8) -> Self {
        NodeId(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discrete flood/moisture alert level, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AlertLevel {
    /// No alert
    #[default]
    None,
    /// Watch conditions
    Low,
    /// Elevated risk
    Mid,
    /// Flooding likely or in progress
    High,
}

impl AlertLevel {
    /// Textual form used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "None",
            AlertLevel::Low => "Low",
            AlertLevel::Mid => "Mid",
            AlertLevel::High => "High",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown alert level string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown alert level: {0}")]
pub struct UnknownAlertLevel(pub String);

impl FromStr for AlertLevel {
    type Err = UnknownAlertLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "None" => Ok(AlertLevel::None),
            "Low" => Ok(AlertLevel::Low),
            "Mid" => Ok(AlertLevel::Mid),
            "High" => Ok(AlertLevel::High),
            other => Err(UnknownAlertLevel(other.to_string())),
        }
    }
}

/// Current UTC epoch seconds.
pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
