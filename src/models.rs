//! Data models for sensor ingestion and alert aggregation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnsupportedSensorKind;

// ---

/// The closed set of sensor kinds the service accepts.
///
/// Declaration order is the fixed fan-out and merge order used by the alert
/// aggregator, and `Ord` follows it so `BTreeMap` keys serialize the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    // ---
    #[serde(rename = "KY_026")]
    Ky026,
    #[serde(rename = "MQ_2")]
    Mq2,
    #[serde(rename = "MQ_135")]
    Mq135,
    #[serde(rename = "DHT_22")]
    Dht22,
}

/// How a sensor kind represents its `estado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRepr {
    Integer,
    Text,
}

impl SensorKind {
    // ---
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Ky026,
        SensorKind::Mq2,
        SensorKind::Mq135,
        SensorKind::Dht22,
    ];

    /// Wire tag, also used as the broker routing key.
    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Ky026 => "KY_026",
            SensorKind::Mq2 => "MQ_2",
            SensorKind::Mq135 => "MQ_135",
            SensorKind::Dht22 => "DHT_22",
        }
    }

    pub fn state_repr(self) -> StateRepr {
        match self {
            SensorKind::Dht22 => StateRepr::Text,
            SensorKind::Ky026 | SensorKind::Mq2 | SensorKind::Mq135 => StateRepr::Integer,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = UnsupportedSensorKind;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == tag)
            .ok_or_else(|| UnsupportedSensorKind {
                kind: tag.to_string(),
            })
    }
}

/// The `estado` field exactly as it arrived on the wire.
///
/// Resolved into a [`SensorState`] by the normalizer and never passed further.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum RawState {
    // ---
    Integer(i64),
    Number(f64),
    Text(String),
    Flag(bool),
    #[default]
    Null,
}

/// Raw request body for `POST /api/sensors`.
#[derive(Debug, Deserialize)]
pub struct InboundReading {
    // ---
    #[serde(rename = "numeroSerie")]
    pub numero_serie: String,
    pub sensor: String,
    pub fecha_activacion: String,
    pub fecha_desactivacion: String,
    #[serde(default)]
    pub estado: RawState,
}

/// A state value in the representation its sensor kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorState {
    Integer(i64),
    Text(String),
}

/// A reading whose `estado` has been resolved for its kind.
///
/// Built only by [`crate::normalize::normalize_reading`], so `estado` always
/// matches `kind.state_repr()`. Serializes with the inbound field names; this
/// is the message body published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReading {
    // ---
    #[serde(rename = "numeroSerie")]
    pub numero_serie: String,
    #[serde(rename = "sensor")]
    pub kind: SensorKind,
    pub fecha_activacion: String,
    pub fecha_desactivacion: String,
    pub estado: SensorState,
}

/// A persisted reading as returned by the alerts endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    // ---
    pub id: i64,
    pub fecha_activacion: String,
    pub fecha_desactivacion: String,
    pub estado: SensorState,
    pub numero_serie: String,
}

/// Alert history for every device a user owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertBundle {
    // ---
    pub user_id: i64,
    pub devices: Vec<String>,
    pub alerts: BTreeMap<SensorKind, Vec<StoredReading>>,
}

impl AlertBundle {
    // ---
    /// Bundle for a user without devices: every kind present, all empty.
    pub fn empty(user_id: i64) -> Self {
        AlertBundle {
            user_id,
            devices: Vec::new(),
            alerts: SensorKind::ALL
                .into_iter()
                .map(|kind| (kind, Vec::new()))
                .collect(),
        }
    }
}
