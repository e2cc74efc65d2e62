//! Irrigation and fertilization decisions
//!
//! Pure functions over a reading, a crop profile and the cooldown timestamps.
//! No I/O. The engine turns a positive decision into a command.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PolicyConfig;
use crate::types::{Band, FarmAutomationState, NpkBands, RainSignal, SensorSnapshot};

/// Whether `cooldown_hours` have passed since `last`. Never acted counts as passed.
pub fn cooldown_elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown_hours: f64) -> bool {
    FarmAutomationState::hours_since(last, now).map_or(true, |h| h >= cooldown_hours)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IrrigationDecision {
    pub needs_water: bool,
    pub very_low: bool,
    pub cooldown_ok: bool,
    /// Unknown forecast reads as not likely
    pub rain_likely: bool,
    pub should_irrigate: bool,
}

/// Irrigate when moisture is below the band minimum by more than the slack,
/// the cooldown has passed, and rain is not imminent. A deficit beyond the
/// very-low margin irrigates regardless of rain.
pub fn decide_irrigation(
    moisture: f64,
    band: &Band,
    rain: Option<&RainSignal>,
    last_irrigation_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_hours: f64,
    policy: &PolicyConfig,
) -> IrrigationDecision {
    let needs_water = moisture < band.min() - policy.moisture_slack;
    let very_low = moisture < band.min() - policy.very_low_margin;
    let cooldown_ok = cooldown_elapsed(last_irrigation_at, now, cooldown_hours);
    let rain_likely = rain.is_some_and(|r| r.rain_likely_next_6h);

    IrrigationDecision {
        needs_water,
        very_low,
        cooldown_ok,
        rain_likely,
        should_irrigate: needs_water && cooldown_ok && (!rain_likely || very_low),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FertilizationDecision {
    /// Nutrients below their band minimum
    pub low: Vec<&'static str>,
    pub cooldown_ok: bool,
    pub moisture_ok: bool,
    pub should_fertilize: bool,
}

impl FertilizationDecision {
    pub fn nutrients_low(&self) -> bool {
        !self.low.is_empty()
    }
}

/// Fertilize when any macronutrient is below its band minimum, the cooldown
/// has passed, and the soil is moist enough to take it up.
pub fn decide_fertilization(
    reading: &SensorSnapshot,
    npk: &NpkBands,
    last_fertilizer_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown_hours: f64,
    policy: &PolicyConfig,
) -> FertilizationDecision {
    let low: Vec<&'static str> = [
        ("nitrogen", reading.nitrogen, &npk.nitrogen),
        ("phosphorus", reading.phosphorus, &npk.phosphorus),
        ("potassium", reading.potassium, &npk.potassium),
    ]
    .into_iter()
    .filter(|(_, value, band)| *value < band.min())
    .map(|(name, _, _)| name)
    .collect();

    let cooldown_ok = cooldown_elapsed(last_fertilizer_at, now, cooldown_hours);
    let moisture_ok = reading.soil_moisture >= policy.fertilizer_min_moisture;

    FertilizationDecision {
        should_fertilize: !low.is_empty() && cooldown_ok && moisture_ok,
        low,
        cooldown_ok,
        moisture_ok,
    }
}

/// Human-readable rain context for audit entries
pub fn describe_rain(rain: Option<&RainSignal>) -> String {
    match rain {
        Some(r) if r.rain_likely_next_6h => {
            format!("likely ({:.1} mm, pop {:.2})", r.rain_mm, r.max_pop)
        }
        Some(r) => format!("unlikely ({:.1} mm, pop {:.2})", r.rain_mm, r.max_pop),
        None => "unknown".to_string(),
    }
}
