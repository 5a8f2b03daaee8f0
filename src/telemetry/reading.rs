//! Sensor reading record and its wire encoding
//!
//! A reading is a flat JSON object. The two weather indicators travel as
//! `0`/`1` because the existing dashboard backend was written against that
//! encoding; both integers and booleans are accepted when parsing.

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// One instantaneous measurement from the simulated panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(with = "flag")]
    pub snow: bool,
    /// km/h
    pub wind_speed: f64,
    #[serde(with = "flag")]
    pub rain_detected: bool,
    /// Operating mode tier, 0.0 to 10.0
    pub switch_state: f64,
    /// W/m²
    pub radiation: f64,
    /// Panel tilt in whole degrees, 0 to 180
    #[serde(rename = "pvAngle")]
    pub pv_angle: u16,
    /// Relative humidity in percent
    pub humidity: f64,
    /// °C
    pub temperature: f64,
    /// Panel output voltage
    pub voltage: f64,
    /// Local wall-clock time, no offset, microsecond precision
    pub timestamp: NaiveDateTime,
}

impl SensorReading {
    /// Serialize to the wire payload
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a wire payload
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Current local time truncated to microseconds
pub fn reading_timestamp() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

mod flag {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(value) => Ok(value),
            Raw::Int(0) => Ok(false),
            Raw::Int(1) => Ok(true),
            Raw::Int(other) => Err(de::Error::custom(format!(
                "expected 0 or 1 for a weather flag, got {other}"
            ))),
        }
    }
}
