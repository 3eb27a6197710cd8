//! Alert decision engine
//!
//! Rules are checked from most to least severe and the first match wins.
//! A node that has not reported contributes zeros and a clear flag; a
//! missing forecast counts as no rain.

use chrono::NaiveDate;
use resiliot_core::{AlertLevel, NodeId};
use resiliot_telemetry::{
    Forecast, ForecastStore, LatestSnapshot, RainIntensity, Reading, ReadingStore, RiverReading,
    SoilWeatherReading, StoreResult,
};
use serde::Serialize;
use tracing::info;

use crate::thresholds::ThresholdSet;

/// Outcome of one evaluation against stored data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub level: AlertLevel,
    pub snapshot: LatestSnapshot,
    pub intensity: RainIntensity,
}

/// Derives the current alert level from readings, forecast and thresholds.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    thresholds: ThresholdSet,
}

impl AlertEngine {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    /// Replace the active thresholds, e.g. after the operator edits them.
    pub fn set_thresholds(&mut self, thresholds: ThresholdSet) {
        self.thresholds = thresholds;
    }

    /// Pure decision over already-loaded inputs.
    pub fn decide(
        soil: Option<&SoilWeatherReading>,
        river: Option<&RiverReading>,
        forecast: Option<&Forecast>,
        thresholds: &ThresholdSet,
    ) -> AlertLevel {
        let soil_pct = soil.map_or(0.0, |s| s.soil);
        let rain_rate = soil.map_or(0.0, |s| s.rain_rate);
        let river_height = river.map_or(0.0, |r| r.river_height);
        let high_flag = river.is_some_and(|r| r.high_level_alert);
        let intensity = forecast.map_or(RainIntensity::None, |f| f.intensity);

        let wet_forecast = matches!(intensity, RainIntensity::Mid | RainIntensity::High);
        let light_forecast = matches!(intensity, RainIntensity::Low | RainIntensity::Mid);

        let (low, mid, high) = (&thresholds.low, &thresholds.mid, &thresholds.high);

        if river_height >= high.river_max
            || high_flag
            || (soil_pct >= high.soil_min && wet_forecast)
            || rain_rate >= thresholds.severe_rain()
        {
            return AlertLevel::High;
        }

        if river_height >= mid.river_max
            || (mid.soil_in_band(soil_pct) && wet_forecast)
            || rain_rate >= thresholds.moderate_rain()
        {
            return AlertLevel::Mid;
        }

        if river_height >= low.river_max
            || (low.soil_in_band(soil_pct) && light_forecast)
            || intensity == RainIntensity::Low
        {
            return AlertLevel::Low;
        }

        AlertLevel::None
    }

    /// Load the latest readings and the forecast for `date`, then decide.
    pub fn evaluate<S, F>(&self, store: &S, forecasts: &F, date: NaiveDate) -> StoreResult<Evaluation>
    where
        S: ReadingStore + ?Sized,
        F: ForecastStore + ?Sized,
    {
        let soil = store.latest(NodeId::SOIL_WEATHER)?;
        let river = store.latest(NodeId::RIVER)?;
        let forecast = forecasts.forecast_for(date)?;

        let soil = soil.as_ref().and_then(Reading::as_soil_weather);
        let river = river.as_ref().and_then(Reading::as_river);

        let level = Self::decide(soil, river, forecast.as_ref(), &self.thresholds);
        let evaluation = Evaluation {
            level,
            snapshot: LatestSnapshot::from_readings(soil, river),
            intensity: forecast.map_or(RainIntensity::None, |f| f.intensity),
        };

        info!(
            level = %evaluation.level,
            river = evaluation.snapshot.river,
            soil = evaluation.snapshot.soil,
            rain = evaluation.snapshot.rain,
            intensity = %evaluation.intensity,
            "Alert evaluated"
        );
        Ok(evaluation)
    }
}
