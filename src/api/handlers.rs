//! API route handlers
//!
//! Thin adapters from HTTP onto the engine, the in-memory data layer and the
//! read-path projector. Every handler answers through the envelope.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::collaborators::{FarmDataLayer, InMemoryDataLayer};
use crate::crop_profile::CropProfileResolver;
use crate::drift::SnapshotProjector;
use crate::engine::{AutonomousEngine, TickReport};
use crate::types::{SensorSnapshot, TickReason};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AutonomousEngine>,
    /// Data layer readings are ingested into
    pub data: Arc<InMemoryDataLayer>,
    pub projector: Arc<SnapshotProjector>,
    pub profiles: Arc<CropProfileResolver>,
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub engine_running: bool,
    pub registered_farms: usize,
    pub uptime_secs: i64,
    pub last_tick: Option<TickReport>,
}

#[derive(Debug, Serialize)]
pub struct RegisterBody {
    pub farm_id: String,
    /// False when the farm was already registered
    pub newly_registered: bool,
}

#[derive(Debug, Deserialize)]
pub struct AutonomyRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AutonomyBody {
    pub farm_id: String,
    pub enabled: bool,
}

/// Reading pushed by a sensor gateway
#[derive(Debug, Deserialize)]
pub struct ReadingRequest {
    pub soil_moisture: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub temperature: f64,
    /// Defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Defaults to the farm's owner
    #[serde(default)]
    pub farmer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadingAccepted {
    pub farm_id: String,
    /// False when a newer reading was already stored
    pub latest: bool,
}

#[derive(Debug, Serialize)]
pub struct ReloadBody {
    pub crops: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthBody {
        status: "ok",
        engine_running: state.engine.is_running(),
        registered_farms: state.engine.registered_farms().len(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds().max(0),
        last_tick: state.engine.last_report(),
    })
}

/// POST /api/v1/farms/:farm_id/register
pub async fn register_farm(State(state): State<ApiState>, Path(farm_id): Path<String>) -> Response {
    if farm_id.trim().is_empty() {
        return ApiErrorResponse::bad_request("farm id must not be empty");
    }
    let newly_registered = state.engine.register_farm(&farm_id);
    ApiResponse::ok(RegisterBody {
        farm_id,
        newly_registered,
    })
}

/// GET /api/v1/farms/:farm_id/autonomy
pub async fn get_autonomy(State(state): State<ApiState>, Path(farm_id): Path<String>) -> Response {
    let enabled = state.engine.get_autonomous_enabled(&farm_id);
    ApiResponse::ok(AutonomyBody { farm_id, enabled })
}

/// PUT /api/v1/farms/:farm_id/autonomy
pub async fn set_autonomy(
    State(state): State<ApiState>,
    Path(farm_id): Path<String>,
    Json(req): Json<AutonomyRequest>,
) -> Response {
    match state.engine.set_autonomous_enabled(&farm_id, req.enabled) {
        Ok(saved) => ApiResponse::ok(AutonomyBody {
            farm_id,
            enabled: saved.is_autonomous,
        }),
        Err(e) => {
            warn!(farm_id = %farm_id, error = %e, "Failed to persist autonomy flag");
            ApiErrorResponse::internal(format!("failed to persist autonomy flag: {}", e))
        }
    }
}

/// POST /api/v1/farms/:farm_id/readings
pub async fn ingest_reading(
    State(state): State<ApiState>,
    Path(farm_id): Path<String>,
    Json(req): Json<ReadingRequest>,
) -> Response {
    let values = [
        req.soil_moisture,
        req.nitrogen,
        req.phosphorus,
        req.potassium,
        req.temperature,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return ApiErrorResponse::bad_request("reading values must be finite numbers");
    }

    let farmer_id = match req.farmer_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => match state.data.get_farm_by_id(&farm_id).await {
            Ok(Some(farm)) if !farm.farmer_id.is_empty() => farm.farmer_id,
            _ => {
                return ApiErrorResponse::bad_request(format!(
                    "unknown farm {} and no farmer_id given",
                    farm_id
                ))
            }
        },
    };

    let reading = SensorSnapshot {
        soil_moisture: req.soil_moisture,
        nitrogen: req.nitrogen,
        phosphorus: req.phosphorus,
        potassium: req.potassium,
        temperature: req.temperature,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
        farmer_id,
    };
    let latest = state.data.record_reading(&farm_id, reading);
    ApiResponse::with_status(StatusCode::CREATED, ReadingAccepted { farm_id, latest })
}

/// GET /api/v1/farms/:farm_id/readings/latest
///
/// The last reading projected to now by the drift estimator.
pub async fn latest_reading(State(state): State<ApiState>, Path(farm_id): Path<String>) -> Response {
    match state.projector.latest(&farm_id, Utc::now()).await {
        Ok(Some(estimate)) => ApiResponse::ok(estimate),
        Ok(None) => ApiErrorResponse::not_found(format!("no reading for farm {}", farm_id)),
        Err(e) => ApiErrorResponse::service_unavailable(format!("reading fetch failed: {}", e)),
    }
}

/// POST /api/v1/engine/tick
pub async fn manual_tick(State(state): State<ApiState>) -> Response {
    info!("Manual tick requested");
    let report = state.engine.tick(TickReason::Manual).await;
    ApiResponse::ok(report)
}

/// POST /api/v1/crops/reload
pub async fn reload_crops(State(state): State<ApiState>) -> Response {
    match state.profiles.reload() {
        Ok(crops) => ApiResponse::ok(ReloadBody { crops }),
        Err(e) => ApiErrorResponse::internal(format!("crop dataset reload failed: {}", e)),
    }
}
