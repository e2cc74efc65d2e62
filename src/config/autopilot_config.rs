//! Autopilot Configuration - control-loop tunables as TOML values with env overrides
//!
//! Each section implements `Default` with the values from `config::defaults`,
//! so a deployment without a config file behaves exactly like the documented
//! defaults. Environment variables are applied after the file and win.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for an autopilot deployment.
///
/// Load with `AutopilotConfig::load()` which searches:
/// 1. `$AUTOPILOT_CONFIG` env var
/// 2. `./autopilot.toml`
/// 3. Built-in defaults
///
/// and then applies environment overrides and range clamping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutopilotConfig {
    /// Tick cadence and cooldowns
    #[serde(default)]
    pub engine: EngineConfig,

    /// Decision thresholds
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Offline drift model
    #[serde(default)]
    pub drift: DriftConfig,

    /// Forecast provider
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Automation state persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Crop profile dataset
    #[serde(default)]
    pub crops: CropsConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

impl AutopilotConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides and clamp out-of-range values.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env_overrides();
        for adjustment in config.sanitize() {
            warn!("{}", adjustment);
        }
        config
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("AUTOPILOT_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded autopilot config from AUTOPILOT_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from AUTOPILOT_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "AUTOPILOT_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./autopilot.toml
        let local = PathBuf::from("autopilot.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded autopilot config from ./autopilot.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./autopilot.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No autopilot.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path (no env overrides applied).
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparsable environment override");
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "AUTONOMOUS_INTERVAL_SECONDS") {
            self.engine.interval_secs = v;
        }
        if let Some(v) = parsed(&lookup, "AUTONOMOUS_IRRIGATION_COOLDOWN_HOURS") {
            self.engine.irrigation_cooldown_hours = v;
        }
        if let Some(v) = parsed(&lookup, "AUTONOMOUS_FERTILIZER_COOLDOWN_HOURS") {
            self.engine.fertilizer_cooldown_hours = v;
        }

        let drift = &mut self.drift;
        let float_overrides: [(&str, &mut f64); 11] = [
            ("SENSOR_DRIFT_MAX_HOURS", &mut drift.max_hours),
            ("SENSOR_DRIFT_MIN_MINUTES", &mut drift.min_minutes),
            ("SENSOR_DRIFT_MOISTURE_RATE", &mut drift.moisture_rate),
            ("SENSOR_DRIFT_NITROGEN_RATE", &mut drift.nitrogen_rate),
            ("SENSOR_DRIFT_PHOSPHORUS_RATE", &mut drift.phosphorus_rate),
            ("SENSOR_DRIFT_POTASSIUM_RATE", &mut drift.potassium_rate),
            ("SENSOR_DRIFT_IRRIGATION_BUMP", &mut drift.irrigation_bump),
            ("SENSOR_DRIFT_FERTILIZER_N_BUMP", &mut drift.fertilizer_n_bump),
            ("SENSOR_DRIFT_FERTILIZER_P_BUMP", &mut drift.fertilizer_p_bump),
            ("SENSOR_DRIFT_FERTILIZER_K_BUMP", &mut drift.fertilizer_k_bump),
            ("SENSOR_DRIFT_TEMPERATURE_SLOPE", &mut drift.temperature_slope),
        ];
        for (key, slot) in float_overrides {
            if let Some(v) = parsed(&lookup, key) {
                *slot = v;
            }
        }

        if let Some(key) = lookup("OPENWEATHER_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.weather.api_key = Some(key.trim().to_string());
        }
        if let Some(path) = lookup("CROP_DATASET_PATH").filter(|p| !p.trim().is_empty()) {
            self.crops.dataset_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(path) = lookup("AUTOMATION_STATE_PATH").filter(|p| !p.trim().is_empty()) {
            self.storage.state_path = PathBuf::from(path.trim());
        }
    }

    /// Clamp or default out-of-range values.
    ///
    /// Never fails; returns a description of every adjustment made.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut adjustments = Vec::new();

        let e = &mut self.engine;
        if e.interval_secs < defaults::MIN_TICK_INTERVAL_SECS {
            adjustments.push(format!(
                "engine.interval_secs ({}) below floor, clamped to {}",
                e.interval_secs,
                defaults::MIN_TICK_INTERVAL_SECS
            ));
            e.interval_secs = defaults::MIN_TICK_INTERVAL_SECS;
        } else if e.interval_secs > defaults::MAX_TICK_INTERVAL_SECS {
            adjustments.push(format!(
                "engine.interval_secs ({}) above ceiling, clamped to {}",
                e.interval_secs,
                defaults::MAX_TICK_INTERVAL_SECS
            ));
            e.interval_secs = defaults::MAX_TICK_INTERVAL_SECS;
        }
        Self::non_negative_or(
            &mut e.irrigation_cooldown_hours,
            defaults::IRRIGATION_COOLDOWN_HOURS,
            "engine.irrigation_cooldown_hours",
            &mut adjustments,
        );
        Self::non_negative_or(
            &mut e.fertilizer_cooldown_hours,
            defaults::FERTILIZER_COOLDOWN_HOURS,
            "engine.fertilizer_cooldown_hours",
            &mut adjustments,
        );

        let p = &mut self.policy;
        Self::non_negative_or(&mut p.moisture_slack, defaults::MOISTURE_SLACK, "policy.moisture_slack", &mut adjustments);
        Self::non_negative_or(&mut p.very_low_margin, defaults::VERY_LOW_MARGIN, "policy.very_low_margin", &mut adjustments);
        Self::non_negative_or(
            &mut p.fertilizer_min_moisture,
            defaults::FERTILIZER_MIN_MOISTURE,
            "policy.fertilizer_min_moisture",
            &mut adjustments,
        );
        if p.startup_catchup_minutes < 0 {
            adjustments.push(format!(
                "policy.startup_catchup_minutes ({}) negative, reset to {}",
                p.startup_catchup_minutes,
                defaults::STARTUP_CATCHUP_MINUTES
            ));
            p.startup_catchup_minutes = defaults::STARTUP_CATCHUP_MINUTES;
        } else if p.startup_catchup_minutes > defaults::MAX_STARTUP_CATCHUP_MINUTES {
            adjustments.push(format!(
                "policy.startup_catchup_minutes ({}) above ceiling, clamped to {}",
                p.startup_catchup_minutes,
                defaults::MAX_STARTUP_CATCHUP_MINUTES
            ));
            p.startup_catchup_minutes = defaults::MAX_STARTUP_CATCHUP_MINUTES;
        }

        let d = &mut self.drift;
        Self::non_negative_or(&mut d.max_hours, defaults::DRIFT_MAX_HOURS, "drift.max_hours", &mut adjustments);
        Self::non_negative_or(&mut d.min_minutes, defaults::DRIFT_MIN_MINUTES, "drift.min_minutes", &mut adjustments);
        Self::non_negative_or(&mut d.moisture_rate, defaults::DRIFT_MOISTURE_RATE, "drift.moisture_rate", &mut adjustments);
        Self::non_negative_or(&mut d.nitrogen_rate, defaults::DRIFT_NITROGEN_RATE, "drift.nitrogen_rate", &mut adjustments);
        Self::non_negative_or(&mut d.phosphorus_rate, defaults::DRIFT_PHOSPHORUS_RATE, "drift.phosphorus_rate", &mut adjustments);
        Self::non_negative_or(&mut d.potassium_rate, defaults::DRIFT_POTASSIUM_RATE, "drift.potassium_rate", &mut adjustments);
        Self::non_negative_or(&mut d.irrigation_bump, defaults::DRIFT_IRRIGATION_BUMP, "drift.irrigation_bump", &mut adjustments);
        Self::non_negative_or(&mut d.fertilizer_n_bump, defaults::DRIFT_FERTILIZER_N_BUMP, "drift.fertilizer_n_bump", &mut adjustments);
        Self::non_negative_or(&mut d.fertilizer_p_bump, defaults::DRIFT_FERTILIZER_P_BUMP, "drift.fertilizer_p_bump", &mut adjustments);
        Self::non_negative_or(&mut d.fertilizer_k_bump, defaults::DRIFT_FERTILIZER_K_BUMP, "drift.fertilizer_k_bump", &mut adjustments);
        if !d.temperature_slope.is_finite() {
            adjustments.push("drift.temperature_slope not finite, reset to default".to_string());
            d.temperature_slope = default_temperature_slope();
        }
        if d.min_minutes / 60.0 > d.max_hours {
            adjustments.push(format!(
                "drift.min_minutes ({:.1}) exceeds drift.max_hours ({:.1}), reset both to defaults",
                d.min_minutes, d.max_hours
            ));
            d.min_minutes = defaults::DRIFT_MIN_MINUTES;
            d.max_hours = defaults::DRIFT_MAX_HOURS;
        }

        if self.weather.timeout_secs == 0 {
            adjustments.push(format!(
                "weather.timeout_secs is 0, reset to {}",
                defaults::WEATHER_TIMEOUT_SECS
            ));
            self.weather.timeout_secs = defaults::WEATHER_TIMEOUT_SECS;
        }

        adjustments
    }

    fn non_negative_or(value: &mut f64, default: f64, name: &str, adjustments: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass, catch them explicitly
        if !value.is_finite() || *value < 0.0 {
            adjustments.push(format!("{} ({}) out of range, reset to {}", name, value, default));
            *value = default;
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Tick cadence and per-action cooldowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between periodic ticks (floor 60)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Minimum hours between irrigation commands per farm
    #[serde(default = "default_irrigation_cooldown_hours")]
    pub irrigation_cooldown_hours: f64,

    /// Minimum hours between fertilization commands per farm
    #[serde(default = "default_fertilizer_cooldown_hours")]
    pub fertilizer_cooldown_hours: f64,
}

fn default_interval_secs() -> u64 { defaults::TICK_INTERVAL_SECS }
fn default_irrigation_cooldown_hours() -> f64 { defaults::IRRIGATION_COOLDOWN_HOURS }
fn default_fertilizer_cooldown_hours() -> f64 { defaults::FERTILIZER_COOLDOWN_HOURS }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            irrigation_cooldown_hours: default_irrigation_cooldown_hours(),
            fertilizer_cooldown_hours: default_fertilizer_cooldown_hours(),
        }
    }
}

impl EngineConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.interval_secs
                .clamp(defaults::MIN_TICK_INTERVAL_SECS, defaults::MAX_TICK_INTERVAL_SECS),
        )
    }
}

/// Decision thresholds.
///
/// The slack and very-low margins are policy knobs, not physical constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Points below the moisture band minimum before irrigation is needed
    #[serde(default = "default_moisture_slack")]
    pub moisture_slack: f64,

    /// Points below the moisture band minimum that override a rain deferral
    #[serde(default = "default_very_low_margin")]
    pub very_low_margin: f64,

    /// Minimum soil moisture (%) for fertilizer application
    #[serde(default = "default_fertilizer_min_moisture")]
    pub fertilizer_min_moisture: f64,

    /// Startup ticks skip farms evaluated within this many minutes
    #[serde(default = "default_startup_catchup_minutes")]
    pub startup_catchup_minutes: i64,
}

fn default_moisture_slack() -> f64 { defaults::MOISTURE_SLACK }
fn default_very_low_margin() -> f64 { defaults::VERY_LOW_MARGIN }
fn default_fertilizer_min_moisture() -> f64 { defaults::FERTILIZER_MIN_MOISTURE }
fn default_startup_catchup_minutes() -> i64 { defaults::STARTUP_CATCHUP_MINUTES }

impl PolicyConfig {
    /// Catch-up window, bounded to `[0, 24h]` even when unsanitised
    pub fn startup_catchup(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.startup_catchup_minutes
                .clamp(0, defaults::MAX_STARTUP_CATCHUP_MINUTES),
        )
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            moisture_slack: default_moisture_slack(),
            very_low_margin: default_very_low_margin(),
            fertilizer_min_moisture: default_fertilizer_min_moisture(),
            startup_catchup_minutes: default_startup_catchup_minutes(),
        }
    }
}

/// Offline drift model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Elapsed time cap (hours)
    #[serde(default = "default_drift_max_hours")]
    pub max_hours: f64,

    /// Readings younger than this are returned unchanged (minutes)
    #[serde(default = "default_drift_min_minutes")]
    pub min_minutes: f64,

    /// Base moisture decay rate (per hour)
    #[serde(default = "default_moisture_rate")]
    pub moisture_rate: f64,

    /// Base nitrogen decay rate (per hour)
    #[serde(default = "default_nitrogen_rate")]
    pub nitrogen_rate: f64,

    /// Base phosphorus decay rate (per hour)
    #[serde(default = "default_phosphorus_rate")]
    pub phosphorus_rate: f64,

    /// Base potassium decay rate (per hour)
    #[serde(default = "default_potassium_rate")]
    pub potassium_rate: f64,

    /// Moisture points per replayed irrigation
    #[serde(default = "default_irrigation_bump")]
    pub irrigation_bump: f64,

    /// Nitrogen per replayed fertilization
    #[serde(default = "default_fertilizer_n_bump")]
    pub fertilizer_n_bump: f64,

    /// Phosphorus per replayed fertilization
    #[serde(default = "default_fertilizer_p_bump")]
    pub fertilizer_p_bump: f64,

    /// Potassium per replayed fertilization
    #[serde(default = "default_fertilizer_k_bump")]
    pub fertilizer_k_bump: f64,

    /// Moisture decay change per °C away from 25°C
    #[serde(default = "default_temperature_slope")]
    pub temperature_slope: f64,
}

fn default_drift_max_hours() -> f64 { defaults::DRIFT_MAX_HOURS }
fn default_drift_min_minutes() -> f64 { defaults::DRIFT_MIN_MINUTES }
fn default_moisture_rate() -> f64 { defaults::DRIFT_MOISTURE_RATE }
fn default_nitrogen_rate() -> f64 { defaults::DRIFT_NITROGEN_RATE }
fn default_phosphorus_rate() -> f64 { defaults::DRIFT_PHOSPHORUS_RATE }
fn default_potassium_rate() -> f64 { defaults::DRIFT_POTASSIUM_RATE }
fn default_irrigation_bump() -> f64 { defaults::DRIFT_IRRIGATION_BUMP }
fn default_fertilizer_n_bump() -> f64 { defaults::DRIFT_FERTILIZER_N_BUMP }
fn default_fertilizer_p_bump() -> f64 { defaults::DRIFT_FERTILIZER_P_BUMP }
fn default_fertilizer_k_bump() -> f64 { defaults::DRIFT_FERTILIZER_K_BUMP }
fn default_temperature_slope() -> f64 { 0.04 }

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            max_hours: default_drift_max_hours(),
            min_minutes: default_drift_min_minutes(),
            moisture_rate: default_moisture_rate(),
            nitrogen_rate: default_nitrogen_rate(),
            phosphorus_rate: default_phosphorus_rate(),
            potassium_rate: default_potassium_rate(),
            irrigation_bump: default_irrigation_bump(),
            fertilizer_n_bump: default_fertilizer_n_bump(),
            fertilizer_p_bump: default_fertilizer_p_bump(),
            fertilizer_k_bump: default_fertilizer_k_bump(),
            temperature_slope: default_temperature_slope(),
        }
    }
}

/// Forecast provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Provider API key; the rain signal is disabled without one
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_weather_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_weather_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_weather_base_url() -> String { defaults::WEATHER_BASE_URL.to_string() }
fn default_weather_timeout_secs() -> u64 { defaults::WEATHER_TIMEOUT_SECS }

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_secs: default_weather_timeout_secs(),
        }
    }
}

/// Automation state persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_state_path() -> PathBuf { PathBuf::from(defaults::STATE_PATH) }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

/// Crop profile dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CropsConfig {
    /// JSON dataset of crop/soil bands; the built-in table is used without one
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String { defaults::SERVER_ADDR.to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
