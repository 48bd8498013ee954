//! [`ShotBackend`] implementation driving a ComfyUI server.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use clipforge_core::backend::{
    BackendCapabilities, BackendError, GenerationResult, MemoryRequirements, ProgressReporter,
    ShotBackend,
};
use clipforge_core::storyboard::Shot;

use crate::api::{find_output_file, ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::processor::{wait_for_prompt, PromptOutcome};
use crate::workflow::WorkflowTemplate;

impl From<ComfyUIApiError> for BackendError {
    fn from(err: ComfyUIApiError) -> Self {
        BackendError::Request(err.to_string())
    }
}

impl From<ComfyUIClientError> for BackendError {
    fn from(err: ComfyUIClientError) -> Self {
        BackendError::Request(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ComfyUIBackendConfig {
    /// Registry id, e.g. `comfyui:wan`.
    pub id: String,
    pub api_url: String,
    pub ws_url: String,
    pub negative_prompt: String,
    pub max_frames: u32,
    pub estimated_vram_gb: f64,
}

pub struct ComfyUIBackend {
    config: ComfyUIBackendConfig,
    api: ComfyUIApi,
    client: ComfyUIClient,
    workflow: WorkflowTemplate,
    available: AtomicBool,
}

impl ComfyUIBackend {
    pub fn new(config: ComfyUIBackendConfig, workflow: WorkflowTemplate) -> Self {
        let api = ComfyUIApi::new(config.api_url.clone());
        let client = ComfyUIClient::new(config.ws_url.clone());
        Self {
            config,
            api,
            client,
            workflow,
            available: AtomicBool::new(true),
        }
    }

    /// Record reachability, logging only when it changes.
    fn set_available(&self, ok: bool) {
        let was = self.available.swap(ok, Ordering::Relaxed);
        if was != ok {
            tracing::info!(backend = %self.config.id, available = ok, "ComfyUI availability changed");
        }
    }
}

#[async_trait]
impl ShotBackend for ComfyUIBackend {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_text_to_video: true,
            supports_image_to_video: true,
            supports_video_to_video: false,
            supports_first_frame_conditioning: true,
            supports_last_frame_conditioning: false,
            max_frames: self.config.max_frames,
            max_duration_seconds: 10.0,
            recommended_fps: 8,
            requires_gpu: true,
            estimated_vram_gb: self.config.estimated_vram_gb,
        }
    }

    fn memory_requirements(&self) -> MemoryRequirements {
        MemoryRequirements {
            vram_gb: self.config.estimated_vram_gb,
            ram_gb: 2.0,
            disk_space_gb: 1.0,
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Ping the server and record whether it answered.
    async fn refresh_availability(&self) -> bool {
        let ok = match self.api.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = %self.config.id, error = %e, "ComfyUI not reachable");
                false
            }
        };
        self.set_available(ok);
        ok
    }

    fn estimate_time_secs(&self, shot: &Shot) -> f64 {
        // Local sampling cost grows with frames times steps.
        30.0 + (shot.num_frames as f64 * shot.num_inference_steps as f64) / 20.0
    }

    async fn generate(
        &self,
        shot: &Shot,
        work_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<GenerationResult, BackendError> {
        let started = Instant::now();
        tokio::fs::create_dir_all(work_dir).await?;

        // The socket must exist before submission so no progress frames
        // for this prompt are missed.
        let mut conn = match self.client.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.set_available(false);
                return Err(e.into());
            }
        };
        self.set_available(true);
        let workflow = self.workflow.render(shot, &self.config.negative_prompt);
        let submitted = self.api.submit_workflow(&workflow, &conn.client_id).await?;
        let prompt_id = submitted.prompt_id;

        tracing::info!(
            backend = %self.config.id,
            shot_id = %shot.id,
            prompt_id = %prompt_id,
            queue_position = submitted.number,
            "Submitted workflow to ComfyUI",
        );
        progress.report("Queued on ComfyUI", 5.0);

        let outcome = match wait_for_prompt(&mut conn.ws_stream, &prompt_id, progress).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(cancel_err) = self.api.cancel_execution(&prompt_id).await {
                    tracing::warn!(prompt_id = %prompt_id, error = %cancel_err, "Failed to cancel prompt");
                }
                return Err(e.into());
            }
        };
        let _ = conn.ws_stream.close(None).await;

        match outcome {
            PromptOutcome::Completed => {}
            PromptOutcome::Failed(message) => {
                return Ok(GenerationResult::failed(
                    format!("ComfyUI execution failed: {message}"),
                    started.elapsed().as_secs_f64(),
                ));
            }
            PromptOutcome::Interrupted => {
                return Ok(GenerationResult::failed(
                    "ComfyUI execution was interrupted",
                    started.elapsed().as_secs_f64(),
                ));
            }
        }

        progress.report("Downloading generated video", 92.0);
        let history = self.api.get_history(&prompt_id).await?;
        let file = find_output_file(&history, &prompt_id).ok_or_else(|| {
            BackendError::Output(format!("prompt {prompt_id} produced no video output"))
        })?;

        let ext = Path::new(&file.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let dest = work_dir.join(format!("{}_{}.{ext}", shot.id, prompt_id));
        let bytes = self.api.download_output(&file, &dest).await?;
        progress.report("Video generation complete", 100.0);

        let mut metadata = BTreeMap::new();
        metadata.insert("provider".to_string(), serde_json::json!("comfyui"));
        metadata.insert("prompt_id".to_string(), serde_json::json!(prompt_id));
        metadata.insert("bytes".to_string(), serde_json::json!(bytes));

        Ok(GenerationResult {
            success: true,
            output_path: Some(dest),
            duration_seconds: Some(shot.num_frames as f64 / shot.fps.max(1) as f64),
            num_frames: Some(shot.num_frames),
            error_message: None,
            generation_time_seconds: started.elapsed().as_secs_f64(),
            metadata,
        })
    }
}
