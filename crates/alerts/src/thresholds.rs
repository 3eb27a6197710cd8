//! Operator-configured alert thresholds
//!
//! Stored as a JSON object keyed by level name:
//!
//! ```json
//! {
//!   "Low":  { "river_max": 100, "soil_min": 10, "soil_max": 50 },
//!   "Mid":  { "river_max": 200, "soil_min": 5,  "soil_max": 60, "rain_thresh": 3 },
//!   "High": { "river_max": 300, "soil_min": 0,  "soil_max": 70, "rain_thresh": 5 }
//! }
//! ```
//!
//! `river` is accepted as an alias of `river_max`. A set is validated
//! whenever it is loaded or saved; an invalid file is never used.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Rain-rate cutoff for Mid when the file does not set one.
pub const DEFAULT_MODERATE_RAIN: f64 = 3.0;

/// Rain-rate cutoff for High when the file does not set one.
pub const DEFAULT_SEVERE_RAIN: f64 = 5.0;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("Failed to access thresholds at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed thresholds: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid thresholds: {0}")]
    Invalid(String),
}

pub type ThresholdResult<T> = Result<T, ThresholdError>;

/// Limits for a single alert level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    /// River height (cm) at or above which this level applies
    #[serde(alias = "river")]
    pub river_max: f64,
    /// Lower edge of the soil saturation band (%)
    pub soil_min: f64,
    /// Upper edge of the soil saturation band (%)
    pub soil_max: f64,
    /// Rain-rate cutoff (mm/interval), Mid and High only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rain_thresh: Option<f64>,
}

impl LevelThresholds {
    fn new(river_max: f64, soil_min: f64, soil_max: f64) -> Self {
        Self {
            river_max,
            soil_min,
            soil_max,
            rain_thresh: None,
        }
    }

    /// Whether `soil` falls inside `[soil_min, soil_max]`.
    pub fn soil_in_band(&self, soil: f64) -> bool {
        soil >= self.soil_min && soil <= self.soil_max
    }

    fn validate(&self, level: &str) -> ThresholdResult<()> {
        let values = [Some(self.river_max), Some(self.soil_min), Some(self.soil_max), self.rain_thresh];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ThresholdError::Invalid(format!(
                "{level} contains a non-finite value"
            )));
        }
        if self.soil_min >= self.soil_max {
            return Err(ThresholdError::Invalid(format!(
                "{level} soil_min {} must be below soil_max {}",
                self.soil_min, self.soil_max
            )));
        }
        Ok(())
    }
}

/// Thresholds for the three alert levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    #[serde(rename = "Low")]
    pub low: LevelThresholds,
    #[serde(rename = "Mid")]
    pub mid: LevelThresholds,
    #[serde(rename = "High")]
    pub high: LevelThresholds,
}

impl Default for ThresholdSet {
    /// Built-in set used when no thresholds file exists yet.
    fn default() -> Self {
        Self {
            low: LevelThresholds::new(200.0, 20.0, 80.0),
            mid: LevelThresholds::new(220.0, 15.0, 85.0),
            high: LevelThresholds::new(250.0, 10.0, 90.0),
        }
    }
}

impl ThresholdSet {
    /// Rain rate at or above which the level is at least Mid.
    pub fn moderate_rain(&self) -> f64 {
        self.mid.rain_thresh.unwrap_or(DEFAULT_MODERATE_RAIN)
    }

    /// Rain rate at or above which the level is High.
    pub fn severe_rain(&self) -> f64 {
        self.high.rain_thresh.unwrap_or(DEFAULT_SEVERE_RAIN)
    }

    /// Check the invariants every set must satisfy before use.
    pub fn validate(&self) -> ThresholdResult<()> {
        self.low.validate("Low")?;
        self.mid.validate("Mid")?;
        self.high.validate("High")?;

        if self.low.river_max > self.mid.river_max || self.mid.river_max > self.high.river_max {
            return Err(ThresholdError::Invalid(format!(
                "river_max must not decrease from Low to High (got {}, {}, {})",
                self.low.river_max, self.mid.river_max, self.high.river_max
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> ThresholdResult<Self> {
        let set: Self = serde_json::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Load thresholds from `path`, falling back to the built-in defaults
    /// when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> ThresholdResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let set = Self::from_json(&text)?;
                debug!(path = %path.display(), "Loaded thresholds");
                Ok(set)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No thresholds file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ThresholdError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Validate and write to `path` as pretty JSON, replacing any existing
    /// file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> ThresholdResult<()> {
        self.validate()?;
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        let io_err = |source: io::Error| ThresholdError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = path.with_extension("json.tmp");
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        info!(path = %path.display(), "Saved thresholds");
        Ok(())
    }
}
