//! Reference image uploads for image-to-video jobs.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use clipforge_core::types::Timestamp;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadInfo {
    pub file_id: String,
    pub filename: String,
    /// Pass as `reference_image_path` when creating a job.
    pub file_path: String,
    pub file_size_bytes: usize,
    pub uploaded_at: Timestamp,
}

/// POST /api/v1/uploads
///
/// Accepts a multipart `file` field (jpg, jpeg, png or webp, at most
/// 10 MiB) and stores it under the uploads directory.
pub async fn upload_reference_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadInfo>>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Upload is missing a file name".into()))?;

        let uploaded_at = chrono::Utc::now();
        let layout = state.orchestrator.layout();
        let path = layout.upload_path(&filename, uploaded_at)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::BadRequest(format!(
                "File too large. Maximum size: {}MB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        tokio::fs::create_dir_all(&layout.uploads_root)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create uploads dir: {e}")))?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to save upload: {e}")))?;

        let file_id = format!("upload_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        tracing::info!(
            file_id = %file_id,
            path = %path.display(),
            size = data.len(),
            "Reference image uploaded",
        );

        let info = UploadInfo {
            file_id,
            filename,
            file_path: path.to_string_lossy().into_owned(),
            file_size_bytes: data.len(),
            uploaded_at,
        };
        return Ok((StatusCode::CREATED, Json(DataResponse { data: info })));
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{FILE_FIELD}' is required"
    )))
}
