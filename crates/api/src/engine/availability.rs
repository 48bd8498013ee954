use std::sync::Arc;
use std::time::Duration;

use clipforge_pipeline::BackendRegistry;
use tokio::time::MissedTickBehavior;

/// Spawn a background task that re-checks every registered backend once per
/// `every`. Job admission and `/health` read the refreshed flags. Abort the
/// returned handle on shutdown.
pub fn start_availability_refresh(
    registry: Arc<BackendRegistry>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Registration already checked once; skip the immediate tick.
        interval.tick().await;

        loop {
            interval.tick().await;
            let available = registry.refresh_availability().await;
            tracing::debug!(available, "Refreshed backend availability");
        }
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use clipforge_core::backend::{
        BackendCapabilities, BackendError, GenerationResult, ProgressReporter, ShotBackend,
    };
    use clipforge_core::storyboard::Shot;

    use super::*;

    /// Unavailable until `reachable` is set and a check runs.
    #[derive(Default)]
    struct Recovering {
        available: AtomicBool,
        reachable: AtomicBool,
    }

    #[async_trait]
    impl ShotBackend for Recovering {
        fn id(&self) -> &str {
            "comfyui:local"
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                supports_text_to_video: true,
                supports_image_to_video: true,
                supports_video_to_video: false,
                supports_first_frame_conditioning: true,
                supports_last_frame_conditioning: false,
                max_frames: 81,
                max_duration_seconds: 10.0,
                recommended_fps: 8,
                requires_gpu: true,
                estimated_vram_gb: 12.0,
            }
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        async fn refresh_availability(&self) -> bool {
            let reachable = self.reachable.load(Ordering::SeqCst);
            self.available.store(reachable, Ordering::SeqCst);
            reachable
        }

        fn estimate_time_secs(&self, _shot: &Shot) -> f64 {
            1.0
        }

        async fn generate(
            &self,
            _shot: &Shot,
            _work_dir: &Path,
            _progress: &ProgressReporter,
        ) -> Result<GenerationResult, BackendError> {
            Err(BackendError::Unavailable("comfyui:local".into()))
        }
    }

    #[tokio::test]
    async fn recovered_backend_becomes_available() {
        let registry = Arc::new(BackendRegistry::new());
        let backend = Arc::new(Recovering::default());
        registry.register(backend.clone()).await;
        assert_eq!(registry.available_count().await, 0);

        let handle = start_availability_refresh(Arc::clone(&registry), Duration::from_millis(10));
        backend.reachable.store(true, Ordering::SeqCst);

        let recovered = tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.is_available("comfyui:local").await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(recovered.is_ok());

        handle.abort();
    }
}
