use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when at least one backend can take work, otherwise `degraded`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub backends_available: usize,
    /// Whether the storyboard generator is configured to take requests.
    pub storyboard_generator_available: bool,
    pub running_jobs: usize,
}

/// GET /health -- returns service and backend health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backends_available = state.orchestrator.registry().available_count().await;

    let status = if backends_available > 0 { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        backends_available,
        storyboard_generator_available: state.orchestrator.storyboards().is_available(),
        running_jobs: state.orchestrator.running_count(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
