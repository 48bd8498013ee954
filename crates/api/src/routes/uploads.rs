use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::uploads::{self, MAX_UPLOAD_BYTES};
use crate::state::AppState;

/// Multipart framing allowance on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Routes mounted at `/uploads`.
///
/// ```text
/// POST   /                -> upload_reference_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(uploads::upload_reference_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES))
}
