//! System-wide default constants.
//!
//! Centralises the tunables of the control loop, grouped by subsystem.
//! Every value here can be overridden through `AutopilotConfig`.

// ============================================================================
// Engine scheduling
// ============================================================================

/// Default interval between periodic ticks (seconds).
pub const TICK_INTERVAL_SECS: u64 = 600;

/// Lowest accepted tick interval (seconds). Smaller values are clamped up.
pub const MIN_TICK_INTERVAL_SECS: u64 = 60;

/// Highest accepted tick interval (one day). Larger values are clamped down.
pub const MAX_TICK_INTERVAL_SECS: u64 = 86_400;

/// Minimum hours between two irrigation commands for the same farm.
pub const IRRIGATION_COOLDOWN_HOURS: f64 = 2.0;

/// Minimum hours between two fertilization commands for the same farm (7 days).
pub const FERTILIZER_COOLDOWN_HOURS: f64 = 168.0;

// ============================================================================
// Decision policy
// ============================================================================

/// Moisture must fall this many points below the band minimum before watering.
pub const MOISTURE_SLACK: f64 = 2.0;

/// Deficit (points below band minimum) that overrides a rain deferral.
pub const VERY_LOW_MARGIN: f64 = 12.0;

/// Fertilizer is withheld when soil moisture is below this (%).
pub const FERTILIZER_MIN_MOISTURE: f64 = 30.0;

/// A startup tick skips farms evaluated within this many minutes.
pub const STARTUP_CATCHUP_MINUTES: i64 = 6;

/// Longest accepted catch-up window (24 hours).
pub const MAX_STARTUP_CATCHUP_MINUTES: i64 = 1_440;

// ============================================================================
// Offline drift estimation
// ============================================================================

/// Elapsed time is capped at this many hours (7 days).
pub const DRIFT_MAX_HOURS: f64 = 168.0;

/// Readings younger than this many minutes are returned unchanged.
pub const DRIFT_MIN_MINUTES: f64 = 2.0;

/// Base exponential decay rate for soil moisture (per hour).
pub const DRIFT_MOISTURE_RATE: f64 = 0.02;

/// Base exponential decay rate for nitrogen (per hour).
pub const DRIFT_NITROGEN_RATE: f64 = 0.004;

/// Base exponential decay rate for phosphorus (per hour).
pub const DRIFT_PHOSPHORUS_RATE: f64 = 0.002;

/// Base exponential decay rate for potassium (per hour).
pub const DRIFT_POTASSIUM_RATE: f64 = 0.003;

/// Moisture points added for each replayed irrigation action.
pub const DRIFT_IRRIGATION_BUMP: f64 = 15.0;

/// Nitrogen added for each replayed fertilization action (mg/kg).
pub const DRIFT_FERTILIZER_N_BUMP: f64 = 20.0;

/// Phosphorus added for each replayed fertilization action (mg/kg).
pub const DRIFT_FERTILIZER_P_BUMP: f64 = 10.0;

/// Potassium added for each replayed fertilization action (mg/kg).
pub const DRIFT_FERTILIZER_K_BUMP: f64 = 15.0;

/// Upper clamp for projected moisture (%).
pub const MOISTURE_CEILING: f64 = 100.0;

/// Upper clamp for projected nutrient values (mg/kg).
pub const NUTRIENT_CEILING: f64 = 500.0;

// ============================================================================
// Weather
// ============================================================================

/// Forecast look-ahead window (hours).
pub const RAIN_WINDOW_HOURS: i64 = 6;

/// Per-request timeout for the forecast provider (seconds).
pub const WEATHER_TIMEOUT_SECS: u64 = 8;

/// Default forecast endpoint base URL.
pub const WEATHER_BASE_URL: &str = "https://api.openweathermap.org";

// ============================================================================
// Storage
// ============================================================================

/// Default location of the automation state document.
pub const STATE_PATH: &str = "./data/automation_state.json";

// ============================================================================
// HTTP server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";
