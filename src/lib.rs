//! Farm Autopilot: autonomous agronomic control loop
//!
//! Re-evaluates every registered farm on a fixed cadence and decides whether to
//! irrigate or fertilize, with per-farm cooldowns, a rain deferral and fail-soft
//! handling of every external call.
//!
//! ## Architecture
//!
//! - **Crop profiles**: crop + soil → optimal moisture and NPK bands
//! - **Rain signal**: next 6 hours of forecast reduced to "rain likely"
//! - **Drift estimator**: projects stale readings forward (read path only)
//! - **State store**: durable cooldown timestamps and autonomy flag
//! - **Engine**: the scheduler tying the above to commands and audit entries

pub mod api;
pub mod collaborators;
pub mod config;
pub mod crop_profile;
pub mod drift;
pub mod engine;
pub mod storage;
pub mod types;
pub mod weather;

pub use config::AutopilotConfig;

pub use types::{
    ActionKind, ActionLogEntry, Band, CommandType, CropProfile, FarmAutomationState,
    FarmRecord, FarmSettings, FarmStatePatch, NpkBands, RainSignal, SensorSnapshot, TickReason,
};

pub use collaborators::{CollaboratorError, CommandDispatcher, FarmDataLayer};
pub use crop_profile::CropProfileResolver;
pub use drift::{DriftContext, DriftEstimate, OfflineDriftEstimator, SnapshotProjector};
pub use engine::{AutonomousEngine, EngineDeps, EngineError, FarmOutcome, TickReport};
pub use storage::{AutomationStateStore, StateStoreError};
pub use weather::RainSignalProvider;
