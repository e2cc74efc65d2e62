//! Shared data structures for the autonomous agronomy control loop
//!
//! This module defines the types that flow between the control-loop components:
//! - Farm records and crop settings read from the data layer
//! - SensorSnapshot (latest soil reading, read-only to the core)
//! - FarmAutomationState (persisted hysteresis timestamps + autonomy flag)
//! - CropProfile / Band (optimal ranges for moisture and NPK)
//! - RainSignal (6-hour forecast reduction)
//! - ActionLogEntry (append-only audit trail)

mod state;
mod farm;
mod sensor;
mod agronomy;
mod actions;

pub use state::*;
pub use farm::*;
pub use sensor::*;
pub use agronomy::*;
pub use actions::*;
