//! Handlers for the `/jobs` resource.
//!
//! Creation and retry hand the job to the [`JobRunner`](crate::engine::JobRunner);
//! every other endpoint is a thin wrapper over the orchestrator.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use clipforge_core::error::CoreError;
use clipforge_core::job::{GenerationMode, Job, JobStatus, DEFAULT_MAX_SHOTS};
use clipforge_pipeline::CreateJobRequest;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::query::ListJobsParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobBody {
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    /// Defaults to the configured backend.
    pub backend_id: Option<String>,
    #[serde(default = "default_max_shots")]
    #[validate(range(min = 1, max = 10))]
    pub max_shots: usize,
    /// Path returned by `POST /uploads`.
    pub reference_image_path: Option<String>,
    pub generation_mode: Option<GenerationMode>,
    pub style_preferences: Option<serde_json::Value>,
}

fn default_max_shots() -> usize {
    DEFAULT_MAX_SHOTS
}

impl From<CreateJobBody> for CreateJobRequest {
    fn from(body: CreateJobBody) -> Self {
        Self {
            prompt: body.prompt,
            backend_id: body.backend_id,
            reference_image_path: body.reference_image_path,
            max_shots: body.max_shots,
            generation_mode: body.generation_mode,
            style_preferences: body.style_preferences,
        }
    }
}

/// One page of `GET /jobs`.
#[derive(Debug, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

async fn find_job(state: &AppState, job_id: &str) -> AppResult<Job> {
    state
        .orchestrator
        .get(job_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::job_not_found(job_id)))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a job and start it in the background. Returns 201 with the
/// queued job; progress is available over the job's WebSocket.
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJobBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;

    let job = state.orchestrator.create(body.into()).await?;
    state.runner.spawn(job.id.clone());

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs?page=&page_size=&status=
///
/// Jobs newest first, optionally filtered by status.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> AppResult<Json<DataResponse<JobPage>>> {
    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown job status: {raw}")))?,
        ),
        None => None,
    };

    let jobs: Vec<Job> = state
        .orchestrator
        .list()
        .await?
        .into_iter()
        .filter(|job| status.map_or(true, |s| job.status == s))
        .collect();

    let total = jobs.len();
    let page_jobs = jobs
        .into_iter()
        .skip(params.offset())
        .take(params.page_size())
        .collect();

    Ok(Json(DataResponse {
        data: JobPage {
            jobs: page_jobs,
            total,
            page: params.page(),
            page_size: params.page_size(),
        },
    }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = find_job(&state, &job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Delete / cancel / retry
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Removes the record and every artifact. Returns 204, or 409 while the
/// job is running.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.orchestrator.delete(&job_id).await? {
        return Err(CoreError::job_not_found(job_id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Returns the job. A running job reports `processing` until its run
/// reaches the next shot boundary and records `cancelled`.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.orchestrator.cancel(&job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/retry
///
/// Re-queue a failed job and run it again from the last completed shot.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.orchestrator.retry(&job_id).await?;
    state.runner.spawn(job.id.clone());

    tracing::info!(job_id = %job.id, retry_count = job.retry_count, "Job retry scheduled");
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/video
///
/// Streams the final video. 400 until the job has completed.
pub async fn download_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job = find_job(&state, &job_id).await?;

    if job.status != JobStatus::Completed {
        return Err(AppError::BadRequest(format!(
            "Job not completed yet. Current status: {}",
            job.status
        )));
    }

    let video_missing = || {
        AppError::Core(CoreError::NotFound {
            entity: "Video",
            id: job_id.clone(),
        })
    };
    let path = job.output_path.as_deref().ok_or_else(video_missing)?;

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(video_missing()),
        Err(e) => return Err(AppError::InternalError(e.to_string())),
    };
    let file_size = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{job_id}.mp4\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
