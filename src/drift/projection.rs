//! Read-path projection of the latest reading

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::{DriftContext, DriftEstimate, OfflineDriftEstimator};
use crate::collaborators::{load_farm_context, CollaboratorError, FarmDataLayer};
use crate::weather::RainSignalProvider;

/// Serves drift-projected readings to callers
pub struct SnapshotProjector {
    data: Arc<dyn FarmDataLayer>,
    rain: Arc<RainSignalProvider>,
    estimator: OfflineDriftEstimator,
}

impl SnapshotProjector {
    pub fn new(
        data: Arc<dyn FarmDataLayer>,
        rain: Arc<RainSignalProvider>,
        estimator: OfflineDriftEstimator,
    ) -> Self {
        Self {
            data,
            rain,
            estimator,
        }
    }

    /// Latest reading of `farm_id` projected to `now`.
    ///
    /// `Ok(None)` when the farm has no reading. Only the reading fetch can
    /// fail; metadata, settings, forecast and action history are best-effort.
    pub async fn latest(
        &self,
        farm_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DriftEstimate>, CollaboratorError> {
        let Some(snapshot) = self.data.get_latest_sensor_data(farm_id).await? else {
            return Ok(None);
        };

        let farm = load_farm_context(self.data.as_ref(), farm_id, &snapshot.farmer_id).await;
        let rain = self
            .rain
            .get_rain_signal(farm.coordinates(), now)
            .await;

        let actions = match self
            .data
            .get_action_logs_since(&snapshot.farmer_id, snapshot.timestamp)
            .await
        {
            Ok(actions) => actions,
            Err(e) => {
                debug!(farm_id, error = %e, "Action history unavailable, projecting without replay");
                Vec::new()
            }
        };

        let ctx = DriftContext {
            soil_type: farm.soil_type().map(str::to_string),
            crop: farm.crop,
            rain,
            actions,
        };
        Ok(Some(self.estimator.estimate(&snapshot, now, &ctx)))
    }
}
