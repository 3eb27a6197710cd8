//! Reading persistence contract

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use resiliot_core::NodeId;
use thiserror::Error;
use tracing::warn;

use crate::forecast::Forecast;
use crate::reading::Reading;

/// Errors raised by a reading store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not create the database directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be turned back into a reading
    #[error("Corrupt row for node {node}: {reason}")]
    CorruptRow {
        /// Node the row belongs to
        node: NodeId,
        /// What was wrong with it
        reason: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// What happened to an inserted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Persisted as a new row
    Stored,
    /// A reading with the same `(timestamp, node)` key already exists; the
    /// earlier row is left untouched.
    Duplicate,
}

/// Durable storage for validated readings.
pub trait ReadingStore {
    /// Persist `reading`, keyed by `(timestamp, source node)`.
    fn insert(&mut self, reading: &Reading) -> StoreResult<InsertOutcome>;

    /// Most recent reading from `node`, if any.
    fn latest(&self, node: NodeId) -> StoreResult<Option<Reading>>;
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: BTreeMap<(NodeId, DateTime<Utc>), Reading>,
    pub(crate) forecasts: BTreeMap<NaiveDate, Forecast>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored readings.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl ReadingStore for MemoryStore {
    fn insert(&mut self, reading: &Reading) -> StoreResult<InsertOutcome> {
        let key = (reading.source(), reading.timestamp());
        if self.readings.contains_key(&key) {
            warn!(
                node = %key.0,
                timestamp = %key.1,
                "Duplicate reading skipped"
            );
            return Ok(InsertOutcome::Duplicate);
        }
        self.readings.insert(key, reading.clone());
        Ok(InsertOutcome::Stored)
    }

    fn latest(&self, node: NodeId) -> StoreResult<Option<Reading>> {
        Ok(self
            .readings
            .range((node, DateTime::<Utc>::MIN_UTC)..=(node, DateTime::<Utc>::MAX_UTC))
            .next_back()
            .map(|(_, reading)| reading.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{RiverReading, SoilWeatherReading};
    use chrono::TimeZone;

    fn river_at(second: u32, height: f64) -> Reading {
        Reading::River(RiverReading {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, second).unwrap(),
            river_height: height,
            rate_of_rise: 0.0,
            high_level_alert: false,
        })
    }

    fn soil_at(second: u32) -> Reading {
        Reading::SoilWeather(SoilWeatherReading {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, second).unwrap(),
            soil: 30.0,
            temperature: 15.0,
            humidity: 70.0,
            rain_rate: 0.0,
            daily_rain: 0.0,
        })
    }

    #[test]
    fn test_latest_per_node() {
        let mut store = MemoryStore::new();
        store.insert(&river_at(1, 10.0)).unwrap();
        store.insert(&river_at(5, 50.0)).unwrap();
        store.insert(&river_at(3, 30.0)).unwrap();
        store.insert(&soil_at(9)).unwrap();

        assert_eq!(store.latest(NodeId::RIVER).unwrap(), Some(river_at(5, 50.0)));
        assert_eq!(store.latest(NodeId::SOIL_WEATHER).unwrap(), Some(soil_at(9)));
        assert_eq!(store.latest(NodeId(7)).unwrap(), None);
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut store = MemoryStore::new();
        assert_eq!(store.insert(&river_at(1, 10.0)).unwrap(), InsertOutcome::Stored);
        assert_eq!(
            store.insert(&river_at(1, 99.0)).unwrap(),
            InsertOutcome::Duplicate
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.latest(NodeId::RIVER).unwrap(), Some(river_at(1, 10.0)));
    }

    #[test]
    fn test_same_second_different_nodes_both_stored() {
        let mut store = MemoryStore::new();
        assert_eq!(store.insert(&river_at(2, 1.0)).unwrap(), InsertOutcome::Stored);
        assert_eq!(store.insert(&soil_at(2)).unwrap(), InsertOutcome::Stored);
        assert_eq!(store.len(), 2);
    }
}
