//! Concrete shot backends and their registration from configuration.

pub mod replicate;

use std::sync::Arc;

use clipforge_comfyui::workflow::WorkflowTemplate;
use clipforge_comfyui::{ComfyUIBackend, ComfyUIBackendConfig};
use clipforge_core::backend::ShotBackend;
use clipforge_core::error::CoreError;

use crate::config::PipelineConfig;
use crate::registry::BackendRegistry;
use replicate::ReplicateBackend;

/// Register every backend the configuration describes.
///
/// Replicate models are always registered (unavailable without a token) so
/// they show up in listings. ComfyUI is registered only when
/// `COMFYUI_API_URL` is set; an unreadable workflow template is an error.
pub async fn register_configured(
    registry: &BackendRegistry,
    config: &PipelineConfig,
) -> Result<(), CoreError> {
    for model in replicate::MODELS {
        registry
            .register(Arc::new(ReplicateBackend::new(
                *model,
                config.replicate_api_token.clone(),
                config.replicate_poll_interval,
            )))
            .await;
    }

    if let Some(comfy) = &config.comfyui {
        let workflow = WorkflowTemplate::load(&comfy.workflow_path)
            .await
            .map_err(|e| CoreError::Configuration(e.to_string()))?;
        let backend = ComfyUIBackend::new(
            ComfyUIBackendConfig {
                id: comfy.backend_id.clone(),
                api_url: comfy.api_url.clone(),
                ws_url: comfy.ws_url.clone(),
                negative_prompt: comfy.negative_prompt.clone(),
                max_frames: config.default_num_frames,
                estimated_vram_gb: 12.0,
            },
            workflow,
        );
        backend.refresh_availability().await;
        registry.register(Arc::new(backend)).await;
    }

    Ok(())
}
