//! Offline drift estimation
//!
//! Projects a stale sensor snapshot forward to `now` without touching the
//! stored reading. Each channel decays exponentially, `v(t) = v0 * e^(-k*t)`
//! with `t` in hours. The moisture rate is scaled by soil texture, crop water
//! demand, temperature and imminent rain; nutrient rates by a leaching factor.
//! Irrigation and fertilization actions logged after the reading are replayed
//! as fixed bumps on top of the decayed values.
//!
//! Read path only. Control decisions act on the last measured values.

mod projection;

pub use projection::SnapshotProjector;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{defaults, DriftConfig};
use crate::crop_profile::canonicalize;
use crate::types::{ActionKind, ActionLogEntry, RainSignal, SensorSnapshot};

/// Environment the projection runs in
#[derive(Debug, Clone, Default)]
pub struct DriftContext {
    pub soil_type: Option<String>,
    pub crop: Option<String>,
    /// `None` when the forecast is unknown
    pub rain: Option<RainSignal>,
    /// Actions logged since the snapshot was taken
    pub actions: Vec<ActionLogEntry>,
}

/// Projected snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftEstimate {
    /// Projected values. `timestamp` is still the time of the real reading.
    pub snapshot: SensorSnapshot,
    pub estimated_at: DateTime<Utc>,
    pub hours_elapsed: f64,
    pub did_adjust: bool,
    pub replayed_actions: usize,
}

/// Per-hour decay rates after modifiers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayRates {
    pub moisture: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

/// Moisture-rate multiplier for a soil texture.
///
/// Sandy soils drain fastest, clay holds water longest.
pub fn soil_factor(soil: Option<&str>) -> f64 {
    let Some(soil) = soil.map(canonicalize) else {
        return 1.0;
    };
    match soil.as_str() {
        "sandy_loam" | "loamy_sand" => 1.2,
        "clay_loam" | "silty_clay_loam" => 0.85,
        s if s.contains("sand") => 1.4,
        s if s.contains("clay") => 0.7,
        s if s.contains("silt") => 0.9,
        s if s.contains("peat") => 0.8,
        _ => 1.0,
    }
}

/// Moisture-rate multiplier for a crop's water demand
pub fn crop_demand_factor(crop: Option<&str>) -> f64 {
    match crop.map(canonicalize).as_deref() {
        Some("rice" | "paddy" | "sugarcane" | "maize" | "corn" | "banana") => 1.25,
        Some("millet" | "sorghum" | "chickpea" | "gram") => 0.85,
        _ => 1.0,
    }
}

/// Linear temperature factor centred on 25 °C, clamped to `[0.6, 2.0]`
pub fn temperature_factor(temperature: f64, slope: f64) -> f64 {
    if !temperature.is_finite() {
        return 1.0;
    }
    (1.0 + slope * (temperature - 25.0)).clamp(0.6, 2.0)
}

/// Moisture-rate multiplier when rain is likely. Heavier rain slows drying more.
pub fn rain_factor(rain: Option<&RainSignal>) -> f64 {
    match rain {
        Some(r) if r.rain_likely_next_6h => (0.6 - 0.02 * r.rain_mm).max(0.25),
        _ => 1.0,
    }
}

/// Nutrient leaching multiplier.
///
/// Rain raises it up to 1.8 at 20 mm. Dry soil with no rain expected lowers it.
pub fn leach_factor(rain: Option<&RainSignal>, moisture: f64) -> f64 {
    match rain {
        Some(r) if r.rain_likely_next_6h => 1.0 + r.rain_mm.min(20.0) / 20.0 * 0.8,
        _ if moisture < 20.0 => 0.9,
        _ => 1.0,
    }
}

/// Projects stale snapshots forward in time
#[derive(Debug, Clone)]
pub struct OfflineDriftEstimator {
    config: DriftConfig,
}

impl Default for OfflineDriftEstimator {
    fn default() -> Self {
        Self::new(DriftConfig::default())
    }
}

impl OfflineDriftEstimator {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Decay rates for this snapshot and context
    pub fn rates(&self, snapshot: &SensorSnapshot, ctx: &DriftContext) -> DecayRates {
        let c = &self.config;
        let moisture = c.moisture_rate.max(0.0)
            * soil_factor(ctx.soil_type.as_deref())
            * crop_demand_factor(ctx.crop.as_deref())
            * temperature_factor(snapshot.temperature, c.temperature_slope)
            * rain_factor(ctx.rain.as_ref());

        let leach = leach_factor(ctx.rain.as_ref(), snapshot.soil_moisture);
        // Phosphorus binds to soil and only takes half the leaching effect
        let p_leach = 1.0 + (leach - 1.0) * 0.5;

        DecayRates {
            moisture,
            nitrogen: c.nitrogen_rate.max(0.0) * leach,
            phosphorus: c.phosphorus_rate.max(0.0) * p_leach,
            potassium: c.potassium_rate.max(0.0) * leach,
        }
    }

    /// Project `latest` to `now`.
    ///
    /// Spans under the minimum threshold, and negative spans from clock skew,
    /// return the snapshot unchanged with `did_adjust = false`.
    pub fn estimate(
        &self,
        latest: &SensorSnapshot,
        now: DateTime<Utc>,
        ctx: &DriftContext,
    ) -> DriftEstimate {
        let hours = self.elapsed_hours(latest.timestamp, now);

        if hours * 60.0 < self.config.min_minutes {
            return DriftEstimate {
                snapshot: latest.clone(),
                estimated_at: now,
                hours_elapsed: hours,
                did_adjust: false,
                replayed_actions: 0,
            };
        }

        let rates = self.rates(latest, ctx);
        let mut projected = latest.clone();
        projected.soil_moisture = decay(latest.soil_moisture, rates.moisture, hours);
        projected.nitrogen = decay(latest.nitrogen, rates.nitrogen, hours);
        projected.phosphorus = decay(latest.phosphorus, rates.phosphorus, hours);
        projected.potassium = decay(latest.potassium, rates.potassium, hours);

        // Each action after the reading adds its fixed bump
        let c = &self.config;
        let mut replayed = 0;
        for action in &ctx.actions {
            if action.timestamp <= latest.timestamp || action.timestamp > now {
                continue;
            }
            match action.action {
                ActionKind::Irrigation => projected.soil_moisture += c.irrigation_bump,
                ActionKind::Fertilization => {
                    projected.nitrogen += c.fertilizer_n_bump;
                    projected.phosphorus += c.fertilizer_p_bump;
                    projected.potassium += c.fertilizer_k_bump;
                }
                ActionKind::Info | ActionKind::Other => continue,
            }
            replayed += 1;
        }

        projected.soil_moisture = clamp_channel(projected.soil_moisture, defaults::MOISTURE_CEILING);
        projected.nitrogen = clamp_channel(projected.nitrogen, defaults::NUTRIENT_CEILING);
        projected.phosphorus = clamp_channel(projected.phosphorus, defaults::NUTRIENT_CEILING);
        projected.potassium = clamp_channel(projected.potassium, defaults::NUTRIENT_CEILING);

        DriftEstimate {
            snapshot: projected,
            estimated_at: now,
            hours_elapsed: hours,
            did_adjust: true,
            replayed_actions: replayed,
        }
    }

    fn elapsed_hours(&self, from: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let hours = (now - from).num_milliseconds() as f64 / 3_600_000.0;
        hours.clamp(0.0, self.config.max_hours.max(0.0))
    }
}

fn decay(value: f64, rate: f64, hours: f64) -> f64 {
    value * (-rate * hours).exp()
}

fn clamp_channel(value: f64, ceiling: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, ceiling)
    } else {
        0.0
    }
}
