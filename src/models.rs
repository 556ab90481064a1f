//! Data models shared by the classifier, the aggregator and the service shell.

use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::localtime;

// ---

/// Physical quantity measured by the tower.
///
/// The string forms are the column names of the `sensor_data` table and the
/// `sensor` query parameter accepted by `/history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKey {
    WaterTemp,
    PhLevel,
    EcLevel,
    EnvTemp,
    Humidity,
    LightLevel,
    Co2Level,
    WaterLevel,
}

impl SensorKey {
    /// Every sensor key, in dashboard order.
    pub const ALL: [SensorKey; 8] = [
        SensorKey::WaterTemp,
        SensorKey::PhLevel,
        SensorKey::EcLevel,
        SensorKey::EnvTemp,
        SensorKey::Humidity,
        SensorKey::LightLevel,
        SensorKey::Co2Level,
        SensorKey::WaterLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKey::WaterTemp => "water_temp",
            SensorKey::PhLevel => "ph_level",
            SensorKey::EcLevel => "ec_level",
            SensorKey::EnvTemp => "env_temp",
            SensorKey::Humidity => "humidity",
            SensorKey::LightLevel => "light_level",
            SensorKey::Co2Level => "co2_level",
            SensorKey::WaterLevel => "water_level",
        }
    }

    /// Display unit used in series statistics.
    pub fn unit(self) -> &'static str {
        match self {
            SensorKey::WaterTemp | SensorKey::EnvTemp => "°C",
            SensorKey::PhLevel => "pH",
            SensorKey::EcLevel => "mS/cm",
            SensorKey::Humidity => "%",
            SensorKey::LightLevel => "lux",
            SensorKey::Co2Level => "ppm",
            SensorKey::WaterLevel => "",
        }
    }

    /// Presence-type sensors report a boolean instead of a number.
    pub fn is_flag(self) -> bool {
        matches!(self, SensorKey::WaterLevel)
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        SensorKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::UnknownSensor { key: s.to_string() })
    }
}

/// A single reading value: numeric for most sensors, boolean for presence sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Number(f64),
    Flag(bool),
}

impl From<f64> for SensorValue {
    fn from(value: f64) -> Self {
        SensorValue::Number(value)
    }
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        SensorValue::Flag(value)
    }
}

// ---

/// Historical row as delivered by the datastore.
///
/// `created_at` is kept exactly as received. Its wall-clock fields are tower
/// local time even though the string carries a UTC tag; use
/// [`SensorRecord::local_time`] rather than parsing it yourself.
///
/// Sensor fields that are missing, null or of the wrong JSON type decode to
/// `None` instead of rejecting the whole row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SensorRecord {
    // ---
    pub created_at: String,
    #[serde(default, deserialize_with = "lenient")]
    pub water_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ph_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ec_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub env_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub light_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub co2_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub water_level: Option<bool>,
}

impl SensorRecord {
    // ---
    /// Empty record stamped with `created_at`.
    pub fn at(created_at: impl Into<String>) -> Self {
        Self {
            created_at: created_at.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter. A value of the wrong kind for `key` leaves the
    /// field empty, the same outcome as a mistyped JSON field.
    pub fn with(mut self, key: SensorKey, value: impl Into<SensorValue>) -> Self {
        // ---
        let value = value.into();
        let number = match value {
            SensorValue::Number(n) => Some(n),
            SensorValue::Flag(_) => None,
        };

        match key {
            SensorKey::WaterTemp => self.water_temp = number,
            SensorKey::PhLevel => self.ph_level = number,
            SensorKey::EcLevel => self.ec_level = number,
            SensorKey::EnvTemp => self.env_temp = number,
            SensorKey::Humidity => self.humidity = number,
            SensorKey::LightLevel => self.light_level = number,
            SensorKey::Co2Level => self.co2_level = number,
            SensorKey::WaterLevel => {
                self.water_level = match value {
                    SensorValue::Flag(flag) => Some(flag),
                    SensorValue::Number(_) => None,
                }
            }
        }
        self
    }

    /// Typed accessor for one sensor field.
    pub fn value(&self, key: SensorKey) -> Option<SensorValue> {
        // ---
        match key {
            SensorKey::WaterTemp => self.water_temp.map(SensorValue::Number),
            SensorKey::PhLevel => self.ph_level.map(SensorValue::Number),
            SensorKey::EcLevel => self.ec_level.map(SensorValue::Number),
            SensorKey::EnvTemp => self.env_temp.map(SensorValue::Number),
            SensorKey::Humidity => self.humidity.map(SensorValue::Number),
            SensorKey::LightLevel => self.light_level.map(SensorValue::Number),
            SensorKey::Co2Level => self.co2_level.map(SensorValue::Number),
            SensorKey::WaterLevel => self.water_level.map(SensorValue::Flag),
        }
    }

    /// Tower wall-clock time of the reading, or `None` if `created_at` is unparseable.
    pub fn local_time(&self) -> Option<NaiveDateTime> {
        localtime::parse_mislabeled(&self.created_at)
    }
}

/// Live sample served by the sensor bridge at `GET /sensors`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    // ---
    #[serde(default, deserialize_with = "lenient")]
    pub water_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ph_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub ec_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub env_temp: Option<f64>,
    #[serde(default, rename = "envHum", deserialize_with = "lenient")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub light_level: Option<f64>,
    #[serde(default, rename = "CO2", deserialize_with = "lenient")]
    pub co2_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub water_level: Option<bool>,
}

impl LiveSnapshot {
    pub fn value(&self, key: SensorKey) -> Option<SensorValue> {
        // ---
        match key {
            SensorKey::WaterTemp => self.water_temp.map(SensorValue::Number),
            SensorKey::PhLevel => self.ph_level.map(SensorValue::Number),
            SensorKey::EcLevel => self.ec_level.map(SensorValue::Number),
            SensorKey::EnvTemp => self.env_temp.map(SensorValue::Number),
            SensorKey::Humidity => self.humidity.map(SensorValue::Number),
            SensorKey::LightLevel => self.light_level.map(SensorValue::Number),
            SensorKey::Co2Level => self.co2_level.map(SensorValue::Number),
            SensorKey::WaterLevel => self.water_level.map(SensorValue::Flag),
        }
    }
}

/// Decode a field, mapping null or a value of the wrong type to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).ok())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_key_round_trips_through_str() {
        // ---
        for key in SensorKey::ALL {
            assert_eq!(key.as_str().parse::<SensorKey>(), Ok(key));
        }
    }

    #[test]
    fn test_unknown_sensor_key_is_rejected() {
        // ---
        let err = "soil_moisture".parse::<SensorKey>().unwrap_err();
        assert_eq!(
            err,
            Error::UnknownSensor {
                key: "soil_moisture".to_string()
            }
        );
    }

    #[test]
    fn test_units() {
        // ---
        assert_eq!(SensorKey::WaterTemp.unit(), "°C");
        assert_eq!(SensorKey::EnvTemp.unit(), "°C");
        assert_eq!(SensorKey::PhLevel.unit(), "pH");
        assert_eq!(SensorKey::EcLevel.unit(), "mS/cm");
        assert_eq!(SensorKey::Humidity.unit(), "%");
        assert_eq!(SensorKey::LightLevel.unit(), "lux");
        assert_eq!(SensorKey::Co2Level.unit(), "ppm");
        assert_eq!(SensorKey::WaterLevel.unit(), "");
    }

    #[test]
    fn test_record_tolerates_dirty_fields() {
        // ---
        let record: SensorRecord = serde_json::from_value(json!({
            "id": 7,
            "created_at": "2024-06-15T14:30:00+00:00",
            "water_temp": 21.5,
            "ph_level": null,
            "ec_level": "1.4",
            "water_level": 1
        }))
        .unwrap();

        assert_eq!(record.value(SensorKey::WaterTemp), Some(SensorValue::Number(21.5)));
        assert_eq!(record.value(SensorKey::PhLevel), None);
        assert_eq!(record.value(SensorKey::EcLevel), None);
        assert_eq!(record.value(SensorKey::Humidity), None);
        assert_eq!(record.value(SensorKey::WaterLevel), None);
    }

    #[test]
    fn test_builder_ignores_mismatched_kinds() {
        // ---
        let record = SensorRecord::at("2024-06-15T14:30:00Z")
            .with(SensorKey::WaterLevel, 1.0)
            .with(SensorKey::PhLevel, true)
            .with(SensorKey::Co2Level, 800.0);

        assert_eq!(record.water_level, None);
        assert_eq!(record.ph_level, None);
        assert_eq!(record.co2_level, Some(800.0));
    }

    #[test]
    fn test_live_snapshot_uses_bridge_field_names() {
        // ---
        let snapshot: LiveSnapshot = serde_json::from_value(json!({
            "lightLevel": 12000,
            "envTemp": 22.35,
            "envHum": 61,
            "CO2": 720,
            "waterTemp": 19.5,
            "phLevel": 6.02,
            "waterLevel": true
        }))
        .unwrap();

        assert_eq!(snapshot.humidity, Some(61.0));
        assert_eq!(snapshot.co2_level, Some(720.0));
        assert_eq!(snapshot.ec_level, None);
        assert_eq!(snapshot.value(SensorKey::WaterLevel), Some(SensorValue::Flag(true)));
    }
}
