//! External collaborators consumed by the control loop
//!
//! The core never owns persistence of farms, readings or audit logs, and never
//! talks to actuators directly. It calls into two opaque services:
//! - [`FarmDataLayer`]: farms, settings, latest readings, audit log
//! - [`CommandDispatcher`]: fire-and-forget actuator commands
//!
//! Implementations provided here:
//! - [`InMemoryDataLayer`]: in-memory store for tests, simulation and the
//!   standalone service binary
//! - [`LoggingDispatcher`]: emits commands as structured log events
//! - [`RecordingDispatcher`]: keeps issued commands for inspection

mod dispatch;
mod memory;

pub use dispatch::{DispatchedCommand, LoggingDispatcher, RecordingDispatcher};
pub use memory::{FarmSeed, InMemoryDataLayer, SeedFile};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use crate::types::{ActionLogEntry, CommandType, FarmRecord, FarmSettings, SensorSnapshot};

/// Errors surfaced by external collaborators
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CollaboratorError {
    /// Whether this is a transport-level failure (logged at low severity).
    pub fn is_network(&self) -> bool {
        matches!(self, CollaboratorError::Network(_) | CollaboratorError::Timeout(_))
    }
}

/// Data layer backing farms, readings and the audit trail.
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
#[async_trait]
pub trait FarmDataLayer: Send + Sync {
    /// Latest sensor reading for a farm, if any
    async fn get_latest_sensor_data(
        &self,
        farm_id: &str,
    ) -> Result<Option<SensorSnapshot>, CollaboratorError>;

    /// Farm metadata (soil type, coordinates, owner)
    async fn get_farm_by_id(&self, farm_id: &str) -> Result<Option<FarmRecord>, CollaboratorError>;

    /// Crop settings of a farmer
    async fn get_farm_settings(
        &self,
        farmer_id: &str,
    ) -> Result<Option<FarmSettings>, CollaboratorError>;

    /// Append an audit-log entry
    async fn create_action_log(&self, entry: ActionLogEntry) -> Result<(), CollaboratorError>;

    /// Audit-log entries of a farmer with `timestamp >= since`, oldest first
    async fn get_action_logs_since(
        &self,
        farmer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActionLogEntry>, CollaboratorError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Actuator-facing command sink
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn write_sensor_command(
        &self,
        command: CommandType,
        farm_id: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Farm metadata and crop, each fetched best-effort
#[derive(Debug, Clone, Default)]
pub struct FarmContext {
    pub farm: Option<FarmRecord>,
    pub crop: Option<String>,
}

impl FarmContext {
    pub fn soil_type(&self) -> Option<&str> {
        self.farm.as_ref().and_then(|f| f.soil_type.as_deref())
    }

    /// Finite `(latitude, longitude)` of the farm, if known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.farm.as_ref().and_then(FarmRecord::coordinates)
    }
}

/// Fetch farm metadata, then the owner's crop setting.
///
/// Settings are keyed by the farm's owner, or by `fallback_farmer` (the
/// snapshot's farmer) when metadata is unavailable. A failed fetch yields
/// `None` for that part only.
pub async fn load_farm_context(
    data: &dyn FarmDataLayer,
    farm_id: &str,
    fallback_farmer: &str,
) -> FarmContext {
    let farm = match data.get_farm_by_id(farm_id).await {
        Ok(farm) => farm,
        Err(e) => {
            debug!(farm_id, backend = data.backend_name(), error = %e, "Farm metadata unavailable");
            None
        }
    };

    let farmer_id = farm
        .as_ref()
        .map(|f| f.farmer_id.as_str())
        .filter(|id| !id.is_empty())
        .unwrap_or(fallback_farmer);

    let crop = if farmer_id.is_empty() {
        None
    } else {
        match data.get_farm_settings(farmer_id).await {
            Ok(settings) => settings.and_then(|s| s.crop),
            Err(e) => {
                debug!(farm_id, farmer_id, error = %e, "Farm settings unavailable");
                None
            }
        }
    };

    FarmContext { farm, crop }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        assert!(CollaboratorError::Network("reset".into()).is_network());
        assert!(CollaboratorError::Timeout(Duration::from_secs(1)).is_network());
        assert!(!CollaboratorError::Backend("boom".into()).is_network());
        assert!(!CollaboratorError::InvalidData("bad".into()).is_network());
    }

    #[test]
    fn test_coordinates_need_both_finite_values() {
        let ctx = |latitude, longitude| FarmContext {
            farm: Some(FarmRecord {
                latitude,
                longitude,
                ..FarmRecord::default()
            }),
            crop: None,
        };
        assert_eq!(ctx(Some(18.5), Some(73.8)).coordinates(), Some((18.5, 73.8)));
        assert_eq!(ctx(Some(18.5), None).coordinates(), None);
        assert_eq!(ctx(Some(f64::NAN), Some(73.8)).coordinates(), None);
        assert_eq!(FarmContext::default().coordinates(), None);
    }
}
