//! Crop dataset loading
//!
//! The dataset is a JSON document of crop → soil → bands:
//!
//! ```json
//! {
//!   "wheat": {
//!     "overall":    { "moisture": [40, 60], "nitrogen": [40, 80], "phosphorus": [20, 40], "potassium": [40, 80] },
//!     "sandy_loam": { "moisture": [35, 55], "nitrogen": { "min": 45, "max": 85 } }
//!   }
//! }
//! ```
//!
//! Crop and soil keys are canonicalised on load. A band may be a two-element
//! array or a `{min, max}` object; anything else falls back to the built-in
//! default band for that channel.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{builtin, canonicalize};
use crate::types::{Band, CropProfile, NpkBands};

/// Soil key holding the crop-wide entry
pub const OVERALL: &str = "overall";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dataset root must be a JSON object")]
    NotAnObject,
}

/// Parsed dataset, keyed by canonical crop then canonical soil
#[derive(Debug, Clone, Default)]
pub struct CropDataset {
    entries: HashMap<String, HashMap<String, CropProfile>>,
    /// Bands that were malformed and replaced by defaults
    repaired_bands: usize,
}

impl CropDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::Io(path.to_path_buf(), e))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DatasetError> {
        let root: Value = serde_json::from_str(raw.trim_start_matches('\u{feff}'))?;
        let crops = root.as_object().ok_or(DatasetError::NotAnObject)?;

        let defaults = builtin::default_profile();
        let mut dataset = Self::default();

        for (crop_name, soils) in crops {
            let crop = canonicalize(crop_name);
            let Some(soils) = soils.as_object() else {
                debug!(crop = %crop_name, "Skipping dataset crop with non-object body");
                continue;
            };
            if crop.is_empty() {
                continue;
            }
            for (soil_name, bands) in soils {
                let soil = canonicalize(soil_name);
                if soil.is_empty() {
                    continue;
                }
                let mut repaired = 0;
                let mut band = |key: &str, default: Band| match parse_band(bands.get(key)) {
                    Some(b) => b,
                    None => {
                        repaired += 1;
                        default
                    }
                };
                let profile = CropProfile {
                    crop: crop.clone(),
                    moisture_optimal: band("moisture", defaults.moisture_optimal),
                    npk_optimal: NpkBands {
                        nitrogen: band("nitrogen", defaults.npk_optimal.nitrogen),
                        phosphorus: band("phosphorus", defaults.npk_optimal.phosphorus),
                        potassium: band("potassium", defaults.npk_optimal.potassium),
                    },
                };
                if repaired > 0 {
                    debug!(crop = %crop, soil = %soil, repaired, "Dataset bands replaced by defaults");
                }
                dataset.repaired_bands += repaired;
                dataset
                    .entries
                    .entry(crop.clone())
                    .or_default()
                    .insert(soil, profile);
            }
        }

        Ok(dataset)
    }

    /// Entry for `(crop, soil)`, falling back to `(crop, overall)`.
    pub fn get(&self, crop: &str, soil: Option<&str>) -> Option<&CropProfile> {
        soil.and_then(|s| self.get_exact(crop, s))
            .or_else(|| self.get_exact(crop, OVERALL))
    }

    /// Entry for exactly `(crop, soil)`
    pub fn get_exact(&self, crop: &str, soil: &str) -> Option<&CropProfile> {
        self.entries.get(crop)?.get(soil)
    }

    pub fn crop_count(&self) -> usize {
        self.entries.len()
    }

    pub fn repaired_bands(&self) -> usize {
        self.repaired_bands
    }
}

fn parse_band(value: Option<&Value>) -> Option<Band> {
    let (a, b) = match value? {
        Value::Array(items) if items.len() == 2 => (as_number(&items[0]), as_number(&items[1])),
        Value::Object(map) => (
            map.get("min").and_then(as_number),
            map.get("max").and_then(as_number),
        ),
        _ => return None,
    };
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some(Band::new(a, b)),
        _ => None,
    }
}

/// Numbers, or numeric strings such as `"40"`
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soil_then_overall_lookup() {
        let dataset = CropDataset::from_json_str(
            r#"{
                "Wheat": {
                    "overall": { "moisture": [40, 60], "nitrogen": [40, 80], "phosphorus": [20, 40], "potassium": [40, 80] },
                    "Sandy Loam": { "moisture": [35, 55], "nitrogen": [45, 85], "phosphorus": [20, 40], "potassium": [40, 80] }
                }
            }"#,
        )
        .unwrap();

        let sandy = dataset.get("wheat", Some("sandy_loam")).unwrap();
        assert_eq!(sandy.moisture_optimal, Band::new(35.0, 55.0));

        let clay = dataset.get("wheat", Some("clay")).unwrap();
        assert_eq!(clay.moisture_optimal, Band::new(40.0, 60.0));

        assert!(dataset.get("rice", None).is_none());
    }

    #[test]
    fn test_malformed_bands_fall_back_per_channel() {
        let dataset = CropDataset::from_json_str(
            r#"{ "okra": { "overall": {
                "moisture": [70, 50],
                "nitrogen": "lots",
                "phosphorus": { "min": "15", "max": 30 },
                "potassium": [1]
            } } }"#,
        )
        .unwrap();

        let okra = dataset.get("okra", None).unwrap();
        let defaults = builtin::default_profile();
        // Inverted band is swapped, not replaced
        assert_eq!(okra.moisture_optimal, Band::new(50.0, 70.0));
        assert_eq!(okra.npk_optimal.nitrogen, defaults.npk_optimal.nitrogen);
        assert_eq!(okra.npk_optimal.phosphorus, Band::new(15.0, 30.0));
        assert_eq!(okra.npk_optimal.potassium, defaults.npk_optimal.potassium);
        assert_eq!(dataset.repaired_bands(), 2);
    }

    #[test]
    fn test_bom_is_tolerated() {
        let dataset = CropDataset::from_json_str("\u{feff}{}").unwrap();
        assert_eq!(dataset.crop_count(), 0);
    }

    #[test]
    fn test_non_object_root_is_error() {
        assert!(matches!(
            CropDataset::from_json_str("[1, 2]"),
            Err(DatasetError::NotAnObject)
        ));
    }
}
