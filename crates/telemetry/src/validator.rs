//! Untrusted packet parsing
//!
//! Plaintext layout after envelope decryption:
//!
//! ```text
//! dest (1 byte) || src (1 byte) || comma-separated decimal fields
//! ```
//!
//! A reading is accepted whole or not at all. Any field that fails to parse
//! or falls outside its physical range rejects the entire packet.

use chrono::{DateTime, Timelike, Utc};
use resiliot_core::NodeId;

use crate::reading::{
    FieldSpec, Reading, RiverReading, SoilWeatherReading, RIVER_FIELDS, SOIL_WEATHER_FIELDS,
};

/// Reasons a decrypted packet does not become a reading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketError {
    /// Too short to hold the two address bytes
    #[error("Packet truncated: {0} bytes")]
    Truncated(usize),

    /// Addressed to another node. A normal discard, not a malformed packet.
    #[error("Packet addressed to node {dest}")]
    NotAddressedToUs {
        /// Destination byte found in the packet
        dest: NodeId,
    },

    /// Source id has no known field layout
    #[error("Unknown source node id: {0}")]
    UnknownSourceId(NodeId),

    /// Wrong number of CSV fields for the source's layout
    #[error("Node {node} sent {actual} fields, expected {expected}")]
    FieldCountMismatch {
        /// Source node
        node: NodeId,
        /// Fields required by the layout
        expected: usize,
        /// Fields received
        actual: usize,
    },

    /// Field is not a finite number within its declared range
    #[error("Field {field} rejected: {raw:?}")]
    FieldOutOfRange {
        /// Name of the offending field
        field: &'static str,
        /// Raw text as received
        raw: String,
    },
}

impl PacketError {
    /// True for packets that are silently dropped rather than reported.
    pub fn is_discard(&self) -> bool {
        matches!(self, PacketError::NotAddressedToUs { .. })
    }
}

/// Result type for packet parsing.
pub type PacketResult<T> = Result<T, PacketError>;

/// Parses decrypted payloads addressed to this receiver.
#[derive(Debug, Clone, Copy)]
pub struct PacketValidator {
    address: NodeId,
}

impl PacketValidator {
    /// Validator for a receiver listening on `address`.
    pub fn new(address: NodeId) -> Self {
        Self { address }
    }

    /// Configured receiver address.
    pub fn address(&self) -> NodeId {
        self.address
    }

    /// Parse a payload, stamping it with the current time.
    pub fn parse(&self, plaintext: &[u8]) -> PacketResult<Reading> {
        self.parse_at(plaintext, Utc::now())
    }

    /// Parse a payload received at `received_at`.
    ///
    /// Senders do not transmit a timestamp; arrival time is authoritative
    /// and is truncated to whole seconds.
    pub fn parse_at(&self, plaintext: &[u8], received_at: DateTime<Utc>) -> PacketResult<Reading> {
        let (header, body) = match plaintext {
            [dest, src, body @ ..] => ((NodeId(*dest), NodeId(*src)), body),
            _ => return Err(PacketError::Truncated(plaintext.len())),
        };
        let (dest, src) = header;

        if dest != self.address {
            return Err(PacketError::NotAddressedToUs { dest });
        }

        let text = String::from_utf8_lossy(body);
        let fields: Vec<&str> = text.split(',').collect();
        let timestamp = received_at.with_nanosecond(0).unwrap_or(received_at);

        match src {
            NodeId::SOIL_WEATHER => {
                let [temperature, humidity, soil, rain_rate, daily_rain] =
                    parse_fields(src, &fields, &SOIL_WEATHER_FIELDS)?;
                Ok(Reading::SoilWeather(SoilWeatherReading {
                    timestamp,
                    soil,
                    temperature,
                    humidity,
                    rain_rate,
                    daily_rain,
                }))
            }
            NodeId::RIVER => {
                let [river_height, rate_of_rise, high_level_alert] =
                    parse_fields(src, &fields, &RIVER_FIELDS)?;
                Ok(Reading::River(RiverReading {
                    timestamp,
                    river_height,
                    rate_of_rise,
                    high_level_alert: high_level_alert == 1.0,
                }))
            }
            other => Err(PacketError::UnknownSourceId(other)),
        }
    }
}

fn parse_fields<const N: usize>(
    node: NodeId,
    fields: &[&str],
    specs: &[FieldSpec; N],
) -> PacketResult<[f64; N]> {
    if fields.len() != N {
        return Err(PacketError::FieldCountMismatch {
            node,
            expected: N,
            actual: fields.len(),
        });
    }

    let mut values = [0.0; N];
    for ((slot, raw), spec) in values.iter_mut().zip(fields).zip(specs) {
        *slot = parse_field(raw, spec)?;
    }
    Ok(values)
}

fn parse_field(raw: &str, spec: &FieldSpec) -> PacketResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| spec.accepts(*value))
        .ok_or_else(|| PacketError::FieldOutOfRange {
            field: spec.name,
            raw: raw.to_string(),
        })
}
