//! Sensor status classification.
//!
//! Turns a single reading into a [`StatusLevel`] and reduces a set of
//! per-sensor levels to one system-wide level. Everything here is pure.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{LiveSnapshot, SensorKey, SensorValue};

// ---

/// Lower shoulder factor: below `min * 0.8` a reading is critical.
pub const CRITICAL_LOW_FACTOR: f64 = 0.8;

/// Upper shoulder factor: above `max * 1.2` a reading is critical.
pub const CRITICAL_HIGH_FACTOR: f64 = 1.2;

/// EC bands in mS/cm.
pub const EC_GOOD: (f64, f64) = (1.2, 2.0);
pub const EC_WARNING: (f64, f64) = (0.8, 2.5);

/// Three-level severity, ordered `Good < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Good,
    Warning,
    Critical,
}

impl StatusLevel {
    /// Dashboard colour for the level.
    pub fn color(self) -> &'static str {
        match self {
            StatusLevel::Good => "#4CAF50",
            StatusLevel::Warning => "#FF9800",
            StatusLevel::Critical => "#F44336",
        }
    }

    /// System banner text when this is the overall level.
    pub fn headline(self) -> &'static str {
        match self {
            StatusLevel::Good => "System OK",
            StatusLevel::Warning => "Warning",
            StatusLevel::Critical => "Critical",
        }
    }
}

/// Acceptable band for the generic classifier.
///
/// Construction enforces `0 < min < max` with both bounds finite. A
/// non-positive floor would flip or collapse the `0.8` shoulder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRange {
    min: f64,
    max: f64,
}

impl SensorRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        // ---
        let reason = if !min.is_finite() || !max.is_finite() {
            Some("bounds must be finite")
        } else if min <= 0.0 {
            Some("min must be strictly positive")
        } else if min >= max {
            Some("min must be below max")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidRange { min, max, reason }),
            None => Ok(Self { min, max }),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Generic threshold rule.
///
/// - `good` inside `[min, max]`, both ends inclusive
/// - `critical` below `min * 0.8` or above `max * 1.2`
/// - `warning` on the shoulders in between
///
/// Non-finite values are `critical`.
pub fn classify(value: f64, range: &SensorRange) -> StatusLevel {
    // ---
    if !value.is_finite() {
        return StatusLevel::Critical;
    }
    if (range.min..=range.max).contains(&value) {
        return StatusLevel::Good;
    }
    if value < range.min * CRITICAL_LOW_FACTOR || value > range.max * CRITICAL_HIGH_FACTOR {
        return StatusLevel::Critical;
    }
    StatusLevel::Warning
}

/// Banded rule for electrical conductivity.
///
/// `good` in `[1.2, 2.0]`, `warning` elsewhere in `[0.8, 2.5]`, `critical`
/// for everything else (including non-finite values).
pub fn classify_ec(value: f64) -> StatusLevel {
    // ---
    if (EC_GOOD.0..=EC_GOOD.1).contains(&value) {
        StatusLevel::Good
    } else if (EC_WARNING.0..=EC_WARNING.1).contains(&value) {
        StatusLevel::Warning
    } else {
        StatusLevel::Critical
    }
}

/// Worst level wins. An empty set of statuses is `Good`.
pub fn combine_overall<I>(statuses: I) -> StatusLevel
where
    I: IntoIterator<Item = StatusLevel>,
{
    statuses
        .into_iter()
        .max()
        .unwrap_or(StatusLevel::Good)
}

// ---

/// Per-sensor acceptable bands for the sensors that use the generic rule.
///
/// EC and water level have fixed rules and no entry here.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub water_temp: SensorRange,
    pub ph_level: SensorRange,
    pub env_temp: SensorRange,
    pub humidity: SensorRange,
    pub light_level: SensorRange,
    pub co2_level: SensorRange,
}

impl Default for Thresholds {
    /// Good bands used by the tower's on-board display.
    fn default() -> Self {
        Self {
            water_temp: SensorRange { min: 18.0, max: 22.0 },
            ph_level: SensorRange { min: 5.5, max: 6.5 },
            env_temp: SensorRange { min: 15.0, max: 25.0 },
            humidity: SensorRange { min: 50.0, max: 70.0 },
            light_level: SensorRange { min: 10.0, max: 40_000.0 },
            co2_level: SensorRange { min: 400.0, max: 1500.0 },
        }
    }
}

impl Thresholds {
    /// Band used for `key`, or `None` for sensors with a fixed rule.
    pub fn range(&self, key: SensorKey) -> Option<&SensorRange> {
        // ---
        match key {
            SensorKey::WaterTemp => Some(&self.water_temp),
            SensorKey::PhLevel => Some(&self.ph_level),
            SensorKey::EnvTemp => Some(&self.env_temp),
            SensorKey::Humidity => Some(&self.humidity),
            SensorKey::LightLevel => Some(&self.light_level),
            SensorKey::Co2Level => Some(&self.co2_level),
            SensorKey::EcLevel | SensorKey::WaterLevel => None,
        }
    }

    pub fn range_mut(&mut self, key: SensorKey) -> Option<&mut SensorRange> {
        // ---
        match key {
            SensorKey::WaterTemp => Some(&mut self.water_temp),
            SensorKey::PhLevel => Some(&mut self.ph_level),
            SensorKey::EnvTemp => Some(&mut self.env_temp),
            SensorKey::Humidity => Some(&mut self.humidity),
            SensorKey::LightLevel => Some(&mut self.light_level),
            SensorKey::Co2Level => Some(&mut self.co2_level),
            SensorKey::EcLevel | SensorKey::WaterLevel => None,
        }
    }

    /// Classify one reading with the rule that belongs to `key`.
    ///
    /// A value of the wrong kind for the sensor (a flag where a number is
    /// expected or the reverse) is treated as `critical`.
    pub fn classify(&self, key: SensorKey, value: SensorValue) -> StatusLevel {
        // ---
        match (key, value) {
            (SensorKey::WaterLevel, SensorValue::Flag(true)) => StatusLevel::Good,
            (SensorKey::WaterLevel, SensorValue::Flag(false)) => StatusLevel::Critical,
            (SensorKey::EcLevel, SensorValue::Number(n)) => classify_ec(n),
            (key, SensorValue::Number(n)) => match self.range(key) {
                Some(range) => classify(n, range),
                None => StatusLevel::Critical,
            },
            (_, SensorValue::Flag(_)) => StatusLevel::Critical,
        }
    }
}

/// Classified live sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub sensors: BTreeMap<SensorKey, StatusLevel>,
    pub overall: StatusLevel,
}

/// Classify every sensor present in `snapshot` and combine the results.
///
/// Sensors the bridge did not report are left out rather than guessed.
pub fn assess(snapshot: &LiveSnapshot, thresholds: &Thresholds) -> SystemStatus {
    // ---
    let sensors: BTreeMap<SensorKey, StatusLevel> = SensorKey::ALL
        .into_iter()
        .filter_map(|key| {
            snapshot
                .value(key)
                .map(|value| (key, thresholds.classify(key, value)))
        })
        .collect();

    let overall = combine_overall(sensors.values().copied());
    tracing::debug!(
        "Assessed {} sensors, overall status {:?}",
        sensors.len(),
        overall
    );

    SystemStatus { sensors, overall }
}
