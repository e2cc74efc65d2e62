//! Autopilot Configuration Module
//!
//! Provides the control-loop configuration loaded from a TOML file, with
//! environment-variable overrides for the documented tunables.
//!
//! ## Loading Order
//!
//! 1. `AUTOPILOT_CONFIG` environment variable (path to TOML file)
//! 2. `autopilot.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Environment overrides (`AUTONOMOUS_INTERVAL_SECONDS`, `SENSOR_DRIFT_*`, ...)
//! are applied on top, then out-of-range values are clamped. Configuration
//! problems are never fatal.
//!
//! ## Usage
//!
//! Load once in `main()` and pass the sections to the components that need
//! them; there is no global configuration:
//!
//! ```ignore
//! let config = AutopilotConfig::load();
//! let store = AutomationStateStore::open(&config.storage.state_path);
//! ```

mod autopilot_config;
pub mod defaults;

pub use autopilot_config::*;
