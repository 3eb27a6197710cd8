//! ResilIoT alerting
//!
//! Maps the latest sensor readings, today's forecast and the operator's
//! thresholds to a single [`AlertLevel`](resiliot_core::AlertLevel).

pub mod engine;
pub mod thresholds;

pub use engine::{AlertEngine, Evaluation};
pub use thresholds::{
    LevelThresholds, ThresholdError, ThresholdResult, ThresholdSet, DEFAULT_MODERATE_RAIN,
    DEFAULT_SEVERE_RAIN,
};
