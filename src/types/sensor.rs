//! Sensor snapshots and actuator command types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest soil reading for a farm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Volumetric soil moisture (%)
    pub soil_moisture: f64,
    /// Nitrogen (mg/kg)
    pub nitrogen: f64,
    /// Phosphorus (mg/kg)
    pub phosphorus: f64,
    /// Potassium (mg/kg)
    pub potassium: f64,
    /// Ambient temperature (°C)
    pub temperature: f64,
    /// When the sensor produced this reading
    pub timestamp: DateTime<Utc>,
    pub farmer_id: String,
}

/// Command sent to the actuator-facing subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    WaterPump,
    Fertilizer,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::WaterPump => "water_pump",
            CommandType::Fertilizer => "fertilizer",
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
