use axum::routing::get;
use axum::Router;

use crate::handlers::backends;
use crate::state::AppState;

/// Routes mounted at `/backends`.
///
/// ```text
/// GET    /                -> list_backends
/// GET    /{id}            -> get_backend
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(backends::list_backends))
        .route("/{id}", get(backends::get_backend))
}
