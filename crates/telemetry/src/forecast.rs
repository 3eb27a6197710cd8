//! Daily weather forecast records
//!
//! Forecasts are fetched by an external job and stored one row per date.
//! The alert engine only ever looks at the rain intensity of today's row.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{MemoryStore, StoreResult};

/// Rain-sum cutoff (mm) below which precipitation counts as light.
pub const LIGHT_RAIN_MAX_MM: f64 = 2.5;

/// Rain-sum cutoff (mm) below which precipitation counts as moderate.
pub const MODERATE_RAIN_MAX_MM: f64 = 7.5;

/// Forecast rain intensity, ordered by severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RainIntensity {
    /// No precipitation expected
    #[default]
    None,
    /// Light rain
    Low,
    /// Moderate rain
    Mid,
    /// Heavy rain
    High,
}

impl RainIntensity {
    /// Forecast vocabulary used in storage: `NA`, `Light`, `Moderate`, `Heavy`.
    pub fn as_forecast_str(&self) -> &'static str {
        match self {
            RainIntensity::None => "NA",
            RainIntensity::Low => "Light",
            RainIntensity::Mid => "Moderate",
            RainIntensity::High => "Heavy",
        }
    }
}

impl fmt::Display for RainIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_forecast_str())
    }
}

/// Text that is not part of the rain intensity vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown rain intensity: {0:?}")]
pub struct UnknownIntensity(pub String);

impl FromStr for RainIntensity {
    type Err = UnknownIntensity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "na" | "none" => Ok(RainIntensity::None),
            "light" | "low" => Ok(RainIntensity::Low),
            "moderate" | "mid" | "medium" => Ok(RainIntensity::Mid),
            "heavy" | "high" => Ok(RainIntensity::High),
            _ => Err(UnknownIntensity(s.to_string())),
        }
    }
}

/// Forecast for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Day the forecast applies to
    pub date: NaiveDate,
    /// Minimum temperature in °C
    pub min_temp: f64,
    /// Maximum temperature in °C
    pub max_temp: f64,
    /// Any precipitation expected
    pub has_precip: bool,
    /// Maximum precipitation probability in percent
    pub precip_prob: u8,
    /// Expected rain intensity
    pub intensity: RainIntensity,
}

impl Forecast {
    /// Build a record from raw daily forecast values.
    pub fn from_daily(
        date: NaiveDate,
        min_temp: f64,
        max_temp: f64,
        precip_prob: u8,
        rain_sum: f64,
    ) -> Self {
        Self {
            date,
            min_temp,
            max_temp,
            has_precip: precip_prob > 0 || rain_sum > 0.0,
            precip_prob,
            intensity: Self::classify_rain(precip_prob, rain_sum),
        }
    }

    /// Map a probability and daily rain sum (mm) to an intensity.
    pub fn classify_rain(precip_prob: u8, rain_sum: f64) -> RainIntensity {
        if precip_prob == 0 && rain_sum <= 0.0 {
            RainIntensity::None
        } else if rain_sum < LIGHT_RAIN_MAX_MM {
            RainIntensity::Low
        } else if rain_sum < MODERATE_RAIN_MAX_MM {
            RainIntensity::Mid
        } else {
            RainIntensity::High
        }
    }
}

/// Storage for daily forecasts.
pub trait ForecastStore {
    /// Insert or replace the forecast for `forecast.date`.
    fn upsert_forecast(&mut self, forecast: &Forecast) -> StoreResult<()>;

    /// Forecast stored for `date`, if any.
    fn forecast_for(&self, date: NaiveDate) -> StoreResult<Option<Forecast>>;
}

impl ForecastStore for MemoryStore {
    fn upsert_forecast(&mut self, forecast: &Forecast) -> StoreResult<()> {
        self.forecasts.insert(forecast.date, forecast.clone());
        Ok(())
    }

    fn forecast_for(&self, date: NaiveDate) -> StoreResult<Option<Forecast>> {
        Ok(self.forecasts.get(&date).cloned())
    }
}
