//! Typed sensor readings and their physical ranges
//!
//! Wire field order differs from storage order: the soil/weather node sends
//! `temp,hum,soil,rain_rate,total_daily_rain` and the river node sends
//! `river_height,rate_of_rise,high_level_alert`.

use chrono::{DateTime, Utc};
use resiliot_core::NodeId;
use serde::{Deserialize, Serialize};

/// Declared physical range of one CSV field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Field name reported on rejection
    pub name: &'static str,
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
    /// Only whole numbers are accepted (flags)
    pub discrete: bool,
}

impl FieldSpec {
    const fn range(name: &'static str, min: f64, max: f64) -> Self {
        Self {
            name,
            min,
            max,
            discrete: false,
        }
    }

    const fn flag(name: &'static str) -> Self {
        Self {
            name,
            min: 0.0,
            max: 1.0,
            discrete: true,
        }
    }

    /// Whether `value` is finite and inside the declared range.
    pub fn accepts(&self, value: f64) -> bool {
        value.is_finite()
            && value >= self.min
            && value <= self.max
            && (!self.discrete || value.fract() == 0.0)
    }
}

/// Soil/weather node fields, in wire order.
pub const SOIL_WEATHER_FIELDS: [FieldSpec; 5] = [
    FieldSpec::range("temp", -30.0, 50.0),
    FieldSpec::range("hum", 0.0, 100.0),
    FieldSpec::range("soil", 0.0, 100.0),
    FieldSpec::range("rain_rate", 0.0, 200.0),
    FieldSpec::range("total_daily_rain", 0.0, 300.0),
];

/// River node fields, in wire order.
pub const RIVER_FIELDS: [FieldSpec; 3] = [
    FieldSpec::range("river_height", 0.0, 250.0),
    FieldSpec::range("rate_of_rise", -250.0, 250.0),
    FieldSpec::flag("high_level_alert"),
];

/// Reading from the soil moisture / weather node (id 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilWeatherReading {
    /// Receiver-side arrival time, second precision
    pub timestamp: DateTime<Utc>,
    /// Soil saturation in percent
    pub soil: f64,
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Rain rate in mm per reporting interval
    pub rain_rate: f64,
    /// Cumulative rain since midnight in mm
    pub daily_rain: f64,
}

/// Reading from the river level node (id 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiverReading {
    /// Receiver-side arrival time, second precision
    pub timestamp: DateTime<Utc>,
    /// River height in cm
    pub river_height: f64,
    /// Change in height per reporting interval in cm
    pub rate_of_rise: f64,
    /// Node-side float switch tripped
    pub high_level_alert: bool,
}

/// A validated reading from one of the two node roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    /// Soil/weather node reading
    SoilWeather(SoilWeatherReading),
    /// River node reading
    River(RiverReading),
}

impl Reading {
    /// Node that produced the reading.
    pub fn source(&self) -> NodeId {
        match self {
            Reading::SoilWeather(_) => NodeId::SOIL_WEATHER,
            Reading::River(_) => NodeId::RIVER,
        }
    }

    /// Arrival timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Reading::SoilWeather(r) => r.timestamp,
            Reading::River(r) => r.timestamp,
        }
    }

    /// Storage key: one reading per node per second.
    pub fn key(&self) -> (DateTime<Utc>, NodeId) {
        (self.timestamp(), self.source())
    }

    /// Soil/weather payload, if this is one.
    pub fn as_soil_weather(&self) -> Option<&SoilWeatherReading> {
        match self {
            Reading::SoilWeather(r) => Some(r),
            Reading::River(_) => None,
        }
    }

    /// River payload, if this is one.
    pub fn as_river(&self) -> Option<&RiverReading> {
        match self {
            Reading::River(r) => Some(r),
            Reading::SoilWeather(_) => None,
        }
    }
}

/// Most recent values with zero defaults for nodes that have not reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    /// Soil saturation in percent
    pub soil: f64,
    /// Air temperature in °C
    pub temp: f64,
    /// Relative humidity in percent
    pub hum: f64,
    /// Rain rate in mm per interval
    pub rain: f64,
    /// Cumulative daily rain in mm
    pub total_rain: f64,
    /// River height in cm
    pub river: f64,
}

impl LatestSnapshot {
    /// Combine the latest reading of each node.
    pub fn from_readings(soil: Option<&SoilWeatherReading>, river: Option<&RiverReading>) -> Self {
        let mut snapshot = Self::default();
        if let Some(s) = soil {
            snapshot.soil = s.soil;
            snapshot.temp = s.temperature;
            snapshot.hum = s.humidity;
            snapshot.rain = s.rain_rate;
            snapshot.total_rain = s.daily_rain;
        }
        if let Some(r) = river {
            snapshot.river = r.river_height;
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_field_spec_bounds_are_inclusive() {
        let temp = SOIL_WEATHER_FIELDS[0];
        assert!(temp.accepts(-30.0));
        assert!(temp.accepts(50.0));
        assert!(!temp.accepts(50.01));
        assert!(!temp.accepts(f64::NAN));
        assert!(!temp.accepts(f64::INFINITY));
    }

    #[test]
    fn test_flag_is_discrete() {
        let flag = RIVER_FIELDS[2];
        assert!(flag.accepts(0.0));
        assert!(flag.accepts(1.0));
        assert!(!flag.accepts(0.5));
        assert!(!flag.accepts(2.0));
    }

    #[test]
    fn test_reading_key() {
        let reading = Reading::River(RiverReading {
            timestamp: ts(),
            river_height: 120.0,
            rate_of_rise: 1.5,
            high_level_alert: false,
        });
        assert_eq!(reading.key(), (ts(), NodeId::RIVER));
        assert!(reading.as_river().is_some());
        assert!(reading.as_soil_weather().is_none());
    }

    #[test]
    fn test_snapshot_defaults_missing_nodes_to_zero() {
        let river = RiverReading {
            timestamp: ts(),
            river_height: 88.0,
            rate_of_rise: 0.0,
            high_level_alert: false,
        };
        let snapshot = LatestSnapshot::from_readings(None, Some(&river));
        assert_eq!(snapshot.river, 88.0);
        assert_eq!(snapshot.soil, 0.0);
        assert_eq!(snapshot.total_rain, 0.0);
    }

    #[test]
    fn test_reading_json_shape() {
        let reading = Reading::SoilWeather(SoilWeatherReading {
            timestamp: ts(),
            soil: 41.0,
            temperature: 12.5,
            humidity: 80.0,
            rain_rate: 0.2,
            daily_rain: 3.4,
        });
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["kind"], "soil_weather");
        assert_eq!(json["soil"], 41.0);
    }
}
