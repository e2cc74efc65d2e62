//! API route table (mounted under `/api/v1`)

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Farm registry and autonomy flag
        .route("/farms/:farm_id/register", post(handlers::register_farm))
        .route(
            "/farms/:farm_id/autonomy",
            get(handlers::get_autonomy).put(handlers::set_autonomy),
        )
        // Readings
        .route("/farms/:farm_id/readings", post(handlers::ingest_reading))
        .route("/farms/:farm_id/readings/latest", get(handlers::latest_reading))
        // Operator controls
        .route("/engine/tick", post(handlers::manual_tick))
        .route("/crops/reload", post(handlers::reload_crops))
        .with_state(state)
}
