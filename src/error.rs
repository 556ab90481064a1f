//! Error types for the classification and aggregation core.
//!
//! Only programmer-error-class inputs surface here. Dirty or missing readings
//! are absorbed by the aggregator and never become an `Error`.

use snafu::Snafu;

/// Invalid-argument errors raised by the core.
#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum Error {
    /// Sensor key outside the fixed vocabulary
    #[snafu(display("Unknown sensor key: {key}"))]
    UnknownSensor { key: String },

    /// Time window other than `day`, `week` or `month`
    #[snafu(display("Unknown time window: {window}"))]
    UnknownWindow { window: String },

    /// Acceptable band that the generic classifier cannot work with
    #[snafu(display("Invalid sensor range [{min}, {max}]: {reason}"))]
    InvalidRange {
        min: f64,
        max: f64,
        reason: &'static str,
    },
}

/// Result type alias for convenience
pub type Result<T, E = Error> = std::result::Result<T, E>;
