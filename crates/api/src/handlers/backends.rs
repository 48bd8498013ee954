//! Handlers for the `/backends` resource.

use axum::extract::{Path, Query, State};
use axum::Json;
use clipforge_core::error::CoreError;
use clipforge_pipeline::BackendInfo;

use crate::error::AppResult;
use crate::query::ListBackendsParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/backends?available_only=
pub async fn list_backends(
    State(state): State<AppState>,
    Query(params): Query<ListBackendsParams>,
) -> AppResult<Json<DataResponse<Vec<BackendInfo>>>> {
    let mut backends = state.orchestrator.registry().list().await;
    if params.available_only {
        backends.retain(|b| b.is_available);
    }
    Ok(Json(DataResponse { data: backends }))
}

/// GET /api/v1/backends/{id}
pub async fn get_backend(
    State(state): State<AppState>,
    Path(backend_id): Path<String>,
) -> AppResult<Json<DataResponse<BackendInfo>>> {
    let info = state
        .orchestrator
        .registry()
        .info(&backend_id)
        .await
        .ok_or(CoreError::NotFound {
            entity: "Backend",
            id: backend_id,
        })?;
    Ok(Json(DataResponse { data: info }))
}
