//! Crop profiles, optimal bands and the rain signal

use serde::{Deserialize, Serialize};

/// Inclusive `[min, max]` range considered agronomically optimal.
///
/// Always satisfies `min <= max`; construction swaps inverted input.
/// Serialised as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Band {
    min: f64,
    max: f64,
}

impl Band {
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    /// Build a band from untrusted input, falling back to `default` when
    /// either bound is missing or non-finite.
    pub fn from_untrusted(a: Option<f64>, b: Option<f64>, default: Band) -> Self {
        match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Self::new(a, b),
            _ => default,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl From<[f64; 2]> for Band {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<Band> for [f64; 2] {
    fn from(band: Band) -> Self {
        [band.min, band.max]
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}-{:.0}", self.min, self.max)
    }
}

/// Optimal bands for the three macronutrients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpkBands {
    pub nitrogen: Band,
    pub phosphorus: Band,
    pub potassium: Band,
}

/// Optimal ranges for a crop (optionally specialised by soil type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropProfile {
    /// Canonical crop key the profile was resolved for
    pub crop: String,
    pub moisture_optimal: Band,
    pub npk_optimal: NpkBands,
}

/// Aggregate of the next 6 hours of forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RainSignal {
    /// `rain_mm >= 1.0 || max_pop >= 0.6`
    pub rain_likely_next_6h: bool,
    /// Highest precipitation probability in the window, `[0, 1]`
    pub max_pop: f64,
    /// Summed precipitation volume in the window (mm)
    pub rain_mm: f64,
}

impl RainSignal {
    /// Rain volume at or above which rain counts as likely (mm)
    pub const LIKELY_RAIN_MM: f64 = 1.0;
    /// Precipitation probability at or above which rain counts as likely
    pub const LIKELY_POP: f64 = 0.6;

    pub fn from_aggregate(max_pop: f64, rain_mm: f64) -> Self {
        let max_pop = max_pop.clamp(0.0, 1.0);
        let rain_mm = rain_mm.max(0.0);
        Self {
            rain_likely_next_6h: rain_mm >= Self::LIKELY_RAIN_MM || max_pop >= Self::LIKELY_POP,
            max_pop,
            rain_mm,
        }
    }
}
