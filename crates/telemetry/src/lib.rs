//! ResilIoT telemetry
//!
//! Turns decrypted radio payloads into typed sensor readings and persists
//! them.
//!
//! This crate provides:
//! - Typed readings for the soil/weather node (id 2) and river node (id 3)
//! - Field-by-field validation of untrusted plaintext ([`PacketValidator`])
//! - The [`ReadingStore`] contract with SQLite and in-memory backends
//! - Daily forecast records consumed by the alert engine

#![warn(missing_docs)]

pub mod forecast;
pub mod reading;
pub mod sqlite;
pub mod store;
pub mod validator;

pub use forecast::{Forecast, ForecastStore, RainIntensity, UnknownIntensity};
pub use reading::{FieldSpec, LatestSnapshot, Reading, RiverReading, SoilWeatherReading};
pub use sqlite::SqliteStore;
pub use store::{InsertOutcome, MemoryStore, ReadingStore, StoreError, StoreResult};
pub use validator::{PacketError, PacketResult, PacketValidator};
