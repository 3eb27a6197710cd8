//! Logging setup for the base station.
//!
//! Everything logs through `tracing`. The binary installs one global
//! subscriber at start-up; `RUST_LOG` overrides [`DEFAULT_DIRECTIVES`].

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVES: &str = "info";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines for a console
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers on unattended nodes
    Json,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber, failing if one is already set.
pub fn try_init(format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(filter());
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_names(true))
            .try_init(),
    }
}

/// Human-readable logging.
///
/// ```no_run
/// resiliot_core::logging::init();
/// tracing::info!(node = 3, "Reading stored");
/// ```
pub fn init() {
    // A subscriber installed earlier (e.g. by a test harness) wins
    let _ = try_init(LogFormat::Pretty);
}

/// JSON logging.
pub fn init_json() {
    let _ = try_init(LogFormat::Json);
}
