//! Status classification and historical aggregation for a hydroponic tower.
//!
//! The core is two pure components:
//! - [`status`] maps readings to good/warning/critical and combines them
//! - [`timeseries`] turns irregular, timezone-mislabeled rows into evenly
//!   bucketed, labelled chart series plus summary statistics
//!
//! Around it sits a thin service shell: configuration, an injected
//! [`source::SensorSource`] and the HTTP routes. Each module re-exports
//! through here so routes and binaries depend only on the crate root.

pub mod config;
pub mod error;
pub mod localtime;
pub mod models;
pub mod routes;
pub mod source;
pub mod status;
pub mod timeseries;

pub use config::Config;
pub use error::Error;
pub use models::{LiveSnapshot, SensorKey, SensorRecord, SensorValue};
pub use source::{SensorSource, TowerSource};
pub use status::{
    assess, classify, classify_ec, combine_overall, SensorRange, StatusLevel, SystemStatus,
    Thresholds,
};
pub use timeseries::{aggregate, AggregatedPoint, Aggregation, SeriesStatistics, TimeWindow};
