//! Shot generation collaborator interface.
//!
//! A [`ShotBackend`] turns one [`Shot`] into a clip on local disk. Backends
//! are registered by id and looked up per shot by the orchestrator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::storyboard::Shot;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend {0} is not available")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("unexpected output: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for CoreError {
    fn from(err: BackendError) -> Self {
        CoreError::collaborator("shot generation", err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Capabilities and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendCapabilities {
    pub supports_text_to_video: bool,
    pub supports_image_to_video: bool,
    pub supports_video_to_video: bool,
    pub supports_first_frame_conditioning: bool,
    pub supports_last_frame_conditioning: bool,
    pub max_frames: u32,
    pub max_duration_seconds: f64,
    pub recommended_fps: u32,
    pub requires_gpu: bool,
    pub estimated_vram_gb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryRequirements {
    pub vram_gb: f64,
    pub ram_gb: f64,
    pub disk_space_gb: f64,
}

/// Outcome of one generation call.
///
/// `success == false` with an `error_message` is a soft failure reported by
/// the provider; hard failures are returned as [`BackendError`].
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub duration_seconds: Option<f64>,
    pub num_frames: Option<u32>,
    pub error_message: Option<String>,
    pub generation_time_seconds: f64,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl GenerationResult {
    pub fn succeeded(output_path: PathBuf, generation_time_seconds: f64) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            generation_time_seconds,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, generation_time_seconds: f64) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            generation_time_seconds,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// One sub-progress report from inside a shot generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotProgress {
    pub message: String,
    /// 0–100 within the shot.
    pub percent: f64,
}

/// Handle given to a backend for reporting sub-progress.
///
/// Reports never block; if the receiving side has gone away they are
/// dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ShotProgress>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ShotProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, message: impl Into<String>, percent: f64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ShotProgress {
                message: message.into(),
                percent,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ShotBackend: Send + Sync {
    /// Registry key, e.g. `replicate:svd-xt`.
    fn id(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    fn memory_requirements(&self) -> MemoryRequirements {
        MemoryRequirements::default()
    }

    /// Whether the backend is configured and reachable enough to accept work.
    fn is_available(&self) -> bool;

    /// Re-check reachability and return the resulting availability.
    /// Backends whose availability is fixed by configuration keep the default.
    async fn refresh_availability(&self) -> bool {
        self.is_available()
    }

    fn estimate_time_secs(&self, shot: &Shot) -> f64;

    /// Generate one clip. The artifact is written somewhere under
    /// `work_dir`; the caller moves it into its canonical location.
    async fn generate(
        &self,
        shot: &Shot,
        work_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<GenerationResult, BackendError>;
}
