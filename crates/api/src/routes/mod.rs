pub mod backends;
pub mod health;
pub mod jobs;
pub mod uploads;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                          list, create
/// /jobs/{id}                     get, delete
/// /jobs/{id}/cancel              cancel (POST)
/// /jobs/{id}/retry               retry (POST)
/// /jobs/{id}/video               final video stream (GET)
///
/// /uploads                       reference image upload (multipart POST)
///
/// /backends                      list registered backends
/// /backends/{id}                 backend detail
///
/// /ws/jobs/{id}                  WebSocket progress stream
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/uploads", uploads::router())
        .nest("/backends", backends::router())
        .route("/ws/jobs/{id}", get(ws::job_progress_ws))
}
