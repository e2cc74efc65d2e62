//! Built-in crop table
//!
//! Fallback bands used when the dataset has no entry for a crop. Moisture is
//! volumetric %, nutrients are mg/kg.

use crate::types::{Band, CropProfile, NpkBands};

/// Key of the catch-all entry
pub const DEFAULT_CROP: &str = "default";

/// (crop, moisture, nitrogen, phosphorus, potassium)
type Row = (&'static str, [f64; 2], [f64; 2], [f64; 2], [f64; 2]);

const TABLE: &[Row] = &[
    ("wheat", [40.0, 60.0], [40.0, 80.0], [20.0, 40.0], [40.0, 80.0]),
    ("rice", [60.0, 85.0], [50.0, 90.0], [20.0, 45.0], [40.0, 80.0]),
    ("maize", [50.0, 70.0], [60.0, 100.0], [25.0, 50.0], [50.0, 90.0]),
    ("cotton", [45.0, 65.0], [40.0, 80.0], [20.0, 40.0], [50.0, 90.0]),
    ("sugarcane", [60.0, 80.0], [70.0, 120.0], [25.0, 50.0], [60.0, 110.0]),
    ("tomato", [60.0, 80.0], [50.0, 90.0], [30.0, 60.0], [60.0, 120.0]),
    ("potato", [60.0, 80.0], [60.0, 100.0], [30.0, 60.0], [80.0, 140.0]),
    ("soybean", [50.0, 70.0], [20.0, 50.0], [25.0, 50.0], [50.0, 90.0]),
    ("groundnut", [45.0, 65.0], [20.0, 40.0], [20.0, 45.0], [40.0, 80.0]),
    ("chickpea", [35.0, 55.0], [15.0, 40.0], [20.0, 45.0], [30.0, 70.0]),
    ("millet", [30.0, 50.0], [30.0, 60.0], [15.0, 35.0], [30.0, 60.0]),
    ("sorghum", [35.0, 55.0], [40.0, 70.0], [15.0, 35.0], [30.0, 70.0]),
    ("banana", [60.0, 80.0], [80.0, 130.0], [25.0, 50.0], [100.0, 160.0]),
    ("onion", [55.0, 75.0], [50.0, 90.0], [25.0, 50.0], [50.0, 100.0]),
    (DEFAULT_CROP, [40.0, 70.0], [40.0, 80.0], [20.0, 50.0], [40.0, 80.0]),
];

/// Alternative names mapped onto table keys
const ALIASES: &[(&str, &str)] = &[
    ("corn", "maize"),
    ("paddy", "rice"),
    ("peanut", "groundnut"),
    ("soya", "soybean"),
    ("soy", "soybean"),
    ("gram", "chickpea"),
];

fn to_profile(row: &Row) -> CropProfile {
    let (crop, moisture, n, p, k) = row;
    CropProfile {
        crop: (*crop).to_string(),
        moisture_optimal: Band::from(*moisture),
        npk_optimal: NpkBands {
            nitrogen: Band::from(*n),
            phosphorus: Band::from(*p),
            potassium: Band::from(*k),
        },
    }
}

/// Map an alias onto its table key (identity for unknown names).
pub fn unalias(crop: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == crop)
        .map_or(crop, |(_, key)| key)
}

/// Built-in profile for a canonical crop key
pub fn lookup(crop: &str) -> Option<CropProfile> {
    let key = unalias(crop);
    TABLE.iter().find(|row| row.0 == key).map(to_profile)
}

/// The catch-all profile
pub fn default_profile() -> CropProfile {
    TABLE
        .iter()
        .find(|row| row.0 == DEFAULT_CROP)
        .map_or_else(
            || to_profile(&(DEFAULT_CROP, [40.0, 70.0], [40.0, 80.0], [20.0, 50.0], [40.0, 80.0])),
            to_profile,
        )
}
