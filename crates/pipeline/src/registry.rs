//! Registry of shot backends keyed by backend id.

use std::collections::HashMap;
use std::sync::Arc;

use clipforge_core::backend::{BackendCapabilities, MemoryRequirements, ShotBackend};
use serde::Serialize;
use tokio::sync::RwLock;

/// Public description of a registered backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub provider: String,
    pub capabilities: BackendCapabilities,
    pub memory_requirements: MemoryRequirements,
    pub is_available: bool,
}

impl BackendInfo {
    fn describe(backend: &dyn ShotBackend) -> Self {
        let id = backend.id().to_string();
        let (provider, name) = split_id(&id);
        Self {
            description: format!("{name} via {provider}"),
            name,
            provider,
            capabilities: backend.capabilities(),
            memory_requirements: backend.memory_requirements(),
            is_available: backend.is_available(),
            id,
        }
    }
}

/// Shared map of `backend_id` → backend.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn ShotBackend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own id, returning any backend it replaced.
    pub async fn register(&self, backend: Arc<dyn ShotBackend>) -> Option<Arc<dyn ShotBackend>> {
        let id = backend.id().to_string();
        tracing::info!(backend_id = %id, available = backend.is_available(), "Registered shot backend");
        self.backends.write().await.insert(id, backend)
    }

    pub async fn unregister(&self, backend_id: &str) -> bool {
        self.backends.write().await.remove(backend_id).is_some()
    }

    pub async fn get(&self, backend_id: &str) -> Option<Arc<dyn ShotBackend>> {
        self.backends.read().await.get(backend_id).cloned()
    }

    /// Registered and currently accepting work.
    pub async fn is_available(&self, backend_id: &str) -> bool {
        self.backends
            .read()
            .await
            .get(backend_id)
            .is_some_and(|b| b.is_available())
    }

    pub async fn info(&self, backend_id: &str) -> Option<BackendInfo> {
        self.backends
            .read()
            .await
            .get(backend_id)
            .map(|b| BackendInfo::describe(b.as_ref()))
    }

    /// All registered backends ordered by id.
    pub async fn list(&self) -> Vec<BackendInfo> {
        let backends = self.backends.read().await;
        let mut infos: Vec<BackendInfo> = backends
            .values()
            .map(|b| BackendInfo::describe(b.as_ref()))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Re-check every backend's reachability and return how many are
    /// available afterwards.
    pub async fn refresh_availability(&self) -> usize {
        let backends: Vec<Arc<dyn ShotBackend>> =
            self.backends.read().await.values().cloned().collect();

        let mut available = 0;
        for backend in backends {
            let before = backend.is_available();
            let now = backend.refresh_availability().await;
            if before != now {
                tracing::info!(backend_id = %backend.id(), available = now, "Backend availability changed");
            }
            if now {
                available += 1;
            }
        }
        available
    }

    pub async fn available_count(&self) -> usize {
        self.backends
            .read()
            .await
            .values()
            .filter(|b| b.is_available())
            .count()
    }
}

/// `replicate:svd-xt` → (`replicate`, `SVD XT`).
fn split_id(id: &str) -> (String, String) {
    match id.split_once(':') {
        Some((provider, model)) => (provider.to_string(), model.to_uppercase().replace('-', " ")),
        None => (id.to_string(), id.to_uppercase().replace('-', " ")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use clipforge_core::backend::{BackendError, GenerationResult, ProgressReporter};
    use clipforge_core::storyboard::Shot;

    use super::*;

    struct Stub {
        id: &'static str,
        available: AtomicBool,
        /// What the next availability check finds.
        reachable: AtomicBool,
    }

    impl Stub {
        fn new(id: &'static str, available: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                available: AtomicBool::new(available),
                reachable: AtomicBool::new(available),
            })
        }
    }

    #[async_trait]
    impl ShotBackend for Stub {
        fn id(&self) -> &str {
            self.id
        }
        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                supports_text_to_video: true,
                supports_image_to_video: false,
                supports_video_to_video: false,
                supports_first_frame_conditioning: false,
                supports_last_frame_conditioning: false,
                max_frames: 25,
                max_duration_seconds: 4.0,
                recommended_fps: 8,
                requires_gpu: false,
                estimated_vram_gb: 0.0,
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
            Err(BackendError::Unavailable("stub".into()))
        }
    }

    #[tokio::test]
    async fn register_get_and_availability() {
        let registry = BackendRegistry::new();
        registry.register(Stub::new("fake:on", true)).await;
        registry.register(Stub::new("fake:off", false)).await;

        assert!(registry.get("fake:on").await.is_some());
        assert!(registry.is_available("fake:on").await);
        assert!(!registry.is_available("fake:off").await);
        assert!(!registry.is_available("missing").await);
        assert_eq!(registry.available_count().await, 1);

        assert!(registry.unregister("fake:off").await);
        assert!(!registry.unregister("fake:off").await);
    }

    #[tokio::test]
    async fn refresh_tracks_backends_going_down_and_up() {
        let registry = BackendRegistry::new();
        let flaky = Stub::new("comfyui:local", true);
        registry.register(flaky.clone()).await;
        registry.register(Stub::new("replicate:svd", false)).await;

        flaky.reachable.store(false, Ordering::SeqCst);
        assert_eq!(registry.refresh_availability().await, 0);
        assert!(!registry.is_available("comfyui:local").await);
        assert!(!registry.info("comfyui:local").await.unwrap().is_available);

        flaky.reachable.store(true, Ordering::SeqCst);
        assert_eq!(registry.refresh_availability().await, 1);
        assert!(registry.is_available("comfyui:local").await);
    }

    #[tokio::test]
    async fn list_is_sorted_and_derives_names() {
        let registry = BackendRegistry::new();
        registry.register(Stub::new("replicate:svd-xt", true)).await;
        registry.register(Stub::new("comfyui:wan", false)).await;

        let infos = registry.list().await;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].id, "comfyui:wan");
        assert_eq!(infos[1].name, "SVD XT");
        assert_eq!(infos[1].provider, "replicate");
        assert_eq!(infos[1].description, "SVD XT via replicate");
    }

    #[test]
    fn id_without_provider_prefix() {
        assert_eq!(split_id("local"), ("local".to_string(), "LOCAL".to_string()));
    }
}
