//! Farm metadata and crop settings as returned by the data layer

use serde::{Deserialize, Serialize};

/// Farm metadata relevant to the control loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmRecord {
    /// Soil texture label (free text, canonicalised before lookup)
    #[serde(default)]
    pub soil_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Owner of the farm; crop settings and audit entries are keyed by it
    pub farmer_id: String,
}

impl FarmRecord {
    /// Coordinates when both are present and finite
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Per-farmer crop settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmSettings {
    #[serde(default)]
    pub crop: Option<String>,
}
