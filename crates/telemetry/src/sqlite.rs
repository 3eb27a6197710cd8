//! SQLite reading store
//!
//! One wide `sensor_readings` table shared by both node roles, with the
//! columns of the other role left NULL, plus a `forecast` table keyed by
//! ISO date. WAL mode lets the dashboard read while the receiver writes.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use resiliot_core::{format_timestamp, parse_timestamp, NodeId};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::forecast::{Forecast, ForecastStore, RainIntensity};
use crate::reading::{Reading, RiverReading, SoilWeatherReading};
use crate::store::{InsertOutcome, ReadingStore, StoreError, StoreResult};

/// Reading store backed by a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    ///
    /// `busy_timeout` bounds how long a write waits on another connection's
    /// lock before failing.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening reading store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;

        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_readings (
                timestamp TEXT NOT NULL,
                soil REAL,
                temp REAL,
                hum REAL,
                rain REAL,
                total_daily_rain REAL,
                river REAL,
                rate_of_rise REAL,
                high_level_alert INTEGER,
                sensor_id INTEGER NOT NULL,
                PRIMARY KEY (timestamp, sensor_id)
            );

            CREATE INDEX IF NOT EXISTS idx_sensor_time
                ON sensor_readings(sensor_id, timestamp);

            CREATE TABLE IF NOT EXISTS forecast (
                date TEXT PRIMARY KEY,
                min_temp REAL,
                max_temp REAL,
                has_precip INTEGER,
                precip_prob INTEGER,
                precip_intensity TEXT
            );
            "#,
        )?;
        Ok(())
    }

    /// Total rows across both node roles.
    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Only a `(timestamp, sensor_id)` key collision is a duplicate; NOT NULL
/// and other constraint failures stay errors.
fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn corrupt(node: NodeId, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        node,
        reason: reason.into(),
    }
}

/// Columns selected by `latest`, in order.
const READING_COLUMNS: &str = "timestamp, soil, temp, hum, rain, total_daily_rain, \
                               river, rate_of_rise, high_level_alert";

struct RawRow {
    timestamp: String,
    values: [Option<f64>; 8],
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut values = [None; 8];
        for (i, value) in values.iter_mut().enumerate() {
            *value = row.get(i + 1)?;
        }
        Ok(Self {
            timestamp: row.get(0)?,
            values,
        })
    }

    fn into_reading(self, node: NodeId) -> StoreResult<Reading> {
        let timestamp = parse_timestamp(&self.timestamp)
            .ok_or_else(|| corrupt(node, format!("bad timestamp {:?}", self.timestamp)))?;
        let column = |i: usize, name: &str| {
            self.values[i].ok_or_else(|| corrupt(node, format!("{name} is NULL")))
        };

        match node {
            NodeId::SOIL_WEATHER => Ok(Reading::SoilWeather(SoilWeatherReading {
                timestamp,
                soil: column(0, "soil")?,
                temperature: column(1, "temp")?,
                humidity: column(2, "hum")?,
                rain_rate: column(3, "rain")?,
                daily_rain: column(4, "total_daily_rain")?,
            })),
            NodeId::RIVER => Ok(Reading::River(RiverReading {
                timestamp,
                river_height: column(5, "river")?,
                rate_of_rise: column(6, "rate_of_rise")?,
                high_level_alert: column(7, "high_level_alert")? != 0.0,
            })),
            other => Err(corrupt(other, "no reading layout for node")),
        }
    }
}

impl ReadingStore for SqliteStore {
    fn insert(&mut self, reading: &Reading) -> StoreResult<InsertOutcome> {
        let timestamp = format_timestamp(&reading.timestamp());
        let node = reading.source();

        let result = match reading {
            Reading::SoilWeather(r) => self.conn.execute(
                r#"
                INSERT INTO sensor_readings (
                    timestamp, soil, temp, hum, rain, total_daily_rain, sensor_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    timestamp,
                    r.soil,
                    r.temperature,
                    r.humidity,
                    r.rain_rate,
                    r.daily_rain,
                    node.as_u8(),
                ],
            ),
            Reading::River(r) => self.conn.execute(
                r#"
                INSERT INTO sensor_readings (
                    timestamp, river, rate_of_rise, high_level_alert, sensor_id
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    timestamp,
                    r.river_height,
                    r.rate_of_rise,
                    r.high_level_alert as i64,
                    node.as_u8(),
                ],
            ),
        };

        match result {
            Ok(_) => {
                debug!(node = %node, timestamp = %timestamp, "Reading stored");
                Ok(InsertOutcome::Stored)
            }
            Err(e) if is_duplicate_key(&e) => {
                warn!(node = %node, timestamp = %timestamp, "Duplicate reading skipped");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn latest(&self, node: NodeId) -> StoreResult<Option<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM sensor_readings \
             WHERE sensor_id = ?1 ORDER BY timestamp DESC LIMIT 1"
        );
        let raw = self
            .conn
            .query_row(&sql, [node.as_u8()], RawRow::from_row)
            .optional()?;

        raw.map(|raw| raw.into_reading(node)).transpose()
    }
}

impl ForecastStore for SqliteStore {
    fn upsert_forecast(&mut self, forecast: &Forecast) -> StoreResult<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO forecast (
                date, min_temp, max_temp, has_precip, precip_prob, precip_intensity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                forecast.date.to_string(),
                forecast.min_temp,
                forecast.max_temp,
                forecast.has_precip as i64,
                forecast.precip_prob,
                forecast.intensity.as_forecast_str(),
            ],
        )?;
        debug!(date = %forecast.date, intensity = %forecast.intensity, "Forecast stored");
        Ok(())
    }

    fn forecast_for(&self, date: NaiveDate) -> StoreResult<Option<Forecast>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT min_temp, max_temp, has_precip, precip_prob, precip_intensity
                FROM forecast
                WHERE date = ?1
                "#,
                [date.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<f64>>(0)?,
                        row.get::<_, Option<f64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(min_temp, max_temp, has_precip, precip_prob, intensity)| {
            let intensity = intensity.unwrap_or_default();
            let intensity = intensity.parse().unwrap_or_else(|_| {
                warn!(date = %date, intensity = %intensity, "Unknown forecast intensity, treating as none");
                RainIntensity::None
            });
            Forecast {
                date,
                min_temp: min_temp.unwrap_or_default(),
                max_temp: max_temp.unwrap_or_default(),
                has_precip: has_precip.unwrap_or_default() != 0,
                precip_prob: precip_prob.unwrap_or_default().clamp(0, 100) as u8,
                intensity,
            }
        }))
    }
}
