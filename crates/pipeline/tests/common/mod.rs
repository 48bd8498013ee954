//! Scripted collaborators for orchestrator tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::assembly::{AssemblyPlan, MediaAssembler};
use clipforge_core::backend::{
    BackendCapabilities, BackendError, GenerationResult, ProgressReporter, ShotBackend,
};
use clipforge_core::error::CoreError;
use clipforge_core::storyboard::{Shot, Storyboard, StoryboardGenerator, StoryboardRequest};
use clipforge_events::ProgressBroadcaster;
use clipforge_pipeline::{BackendRegistry, Orchestrator, PipelineConfig};
use tokio::sync::{mpsc, Semaphore};

pub const BACKEND_ID: &str = "fake:clips";

// ---------------------------------------------------------------------------
// Storyboard generator
// ---------------------------------------------------------------------------

/// Returns a fixed shot list: one `(duration, transition)` pair per shot.
pub struct ScriptedStoryboards {
    pub shots: Vec<(f64, f64)>,
    pub calls: AtomicUsize,
    /// When set, every call fails with this message.
    pub failure: Option<String>,
    pub delay: Option<Duration>,
}

impl ScriptedStoryboards {
    pub fn new(shots: Vec<(f64, f64)>) -> Self {
        Self {
            shots,
            calls: AtomicUsize::new(0),
            failure: None,
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn slow(shots: Vec<(f64, f64)>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(shots)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryboardGenerator for ScriptedStoryboards {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, request: &StoryboardRequest) -> Result<Storyboard, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(CoreError::collaborator("storyboard generation", message.clone()));
        }
        let shots = self
            .shots
            .iter()
            .take(request.max_shots)
            .enumerate()
            .map(|(i, (duration, transition))| {
                let mut shot = Shot::new(
                    format!("shot_{}", i + 1),
                    i as u32 + 1,
                    *duration,
                    format!("Shot {}", i + 1),
                    format!("{} #{}", request.prompt, i + 1),
                );
                shot.transition_duration = *transition;
                shot
            })
            .collect();
        Ok(Storyboard::new(
            "Scripted",
            request.prompt.clone(),
            shots,
            BTreeMap::new(),
            "scripted",
        ))
    }
}

// ---------------------------------------------------------------------------
// Shot backend
// ---------------------------------------------------------------------------

/// Writes a small file per shot. Sequence numbers in `fail_once` report a
/// failed result the first time they are attempted; those in `error_once`
/// return a transport error instead.
pub struct ClipBackend {
    pub fail_once: Mutex<HashSet<u32>>,
    pub error_once: Mutex<HashSet<u32>>,
    pub calls: Mutex<Vec<String>>,
    /// When set, each call announces itself and waits for a permit.
    pub gate: Option<(mpsc::UnboundedSender<String>, Arc<Semaphore>)>,
}

impl ClipBackend {
    pub fn new() -> Self {
        Self {
            fail_once: Mutex::new(HashSet::new()),
            error_once: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing_once(sequence_numbers: &[u32]) -> Self {
        let backend = Self::new();
        backend
            .fail_once
            .lock()
            .unwrap()
            .extend(sequence_numbers.iter().copied());
        backend
    }

    pub fn erroring_once(sequence_numbers: &[u32]) -> Self {
        let backend = Self::new();
        backend
            .error_once
            .lock()
            .unwrap()
            .extend(sequence_numbers.iter().copied());
        backend
    }

    /// Returns the backend, a receiver of started shot ids, and the
    /// semaphore releasing each call.
    pub fn gated() -> (Self, mpsc::UnboundedReceiver<String>, Arc<Semaphore>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(0));
        let backend = Self {
            gate: Some((tx, permits.clone())),
            ..Self::new()
        };
        (backend, rx, permits)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShotBackend for ClipBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_text_to_video: true,
            supports_image_to_video: true,
            supports_video_to_video: false,
            supports_first_frame_conditioning: false,
            supports_last_frame_conditioning: false,
            max_frames: 81,
            max_duration_seconds: 10.0,
            recommended_fps: 8,
            requires_gpu: false,
            estimated_vram_gb: 0.0,
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn estimate_time_secs(&self, _shot: &Shot) -> f64 {
        0.1
    }

    async fn generate(
        &self,
        shot: &Shot,
        work_dir: &Path,
        progress: &ProgressReporter,
    ) -> Result<GenerationResult, BackendError> {
        self.calls.lock().unwrap().push(shot.id.clone());

        if let Some((started, permits)) = &self.gate {
            let _ = started.send(shot.id.clone());
            permits
                .acquire()
                .await
                .map_err(|e| BackendError::Generation(e.to_string()))?
                .forget();
        }

        progress.report("Sampling", 50.0);

        if self.error_once.lock().unwrap().remove(&shot.sequence_number) {
            return Err(BackendError::Request(format!(
                "connection reset during shot {}",
                shot.sequence_number
            )));
        }

        if self.fail_once.lock().unwrap().remove(&shot.sequence_number) {
            return Ok(GenerationResult::failed(
                format!("provider rejected shot {}", shot.sequence_number),
                0.1,
            ));
        }

        tokio::fs::create_dir_all(work_dir).await?;
        let path = work_dir.join(format!("{}.partial.mp4", shot.id));
        tokio::fs::write(&path, shot.generation_prompt.as_bytes()).await?;
        progress.report("Done", 100.0);
        Ok(GenerationResult::succeeded(path, 0.1))
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Reports every clip as `clip_secs` long and writes a marker file.
pub struct RecordingAssembler {
    pub clip_secs: f64,
    pub renders: Mutex<Vec<AssemblyPlan>>,
}

impl RecordingAssembler {
    pub fn new(clip_secs: f64) -> Self {
        Self {
            clip_secs,
            renders: Mutex::new(Vec::new()),
        }
    }

    pub fn renders(&self) -> Vec<AssemblyPlan> {
        self.renders.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaAssembler for RecordingAssembler {
    async fn probe_duration(&self, path: &Path) -> Result<f64, CoreError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(CoreError::collaborator("assembly", format!("missing clip {}", path.display())));
        }
        Ok(self.clip_secs)
    }

    async fn render(&self, plan: &AssemblyPlan, output: &Path) -> Result<(), CoreError> {
        self.renders.lock().unwrap().push(plan.clone());
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        tokio::fs::write(output, b"final")
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub storyboards: Arc<ScriptedStoryboards>,
    pub backend: Arc<ClipBackend>,
    pub assembler: Arc<RecordingAssembler>,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub workspace: tempfile::TempDir,
}

impl Harness {
    pub async fn new(shots: Vec<(f64, f64)>, backend: ClipBackend) -> Self {
        Self::with_clip_secs(shots, backend, 3.0).await
    }

    pub async fn with_clip_secs(shots: Vec<(f64, f64)>, backend: ClipBackend, clip_secs: f64) -> Self {
        Self::build(ScriptedStoryboards::new(shots), backend, clip_secs, |_| {}).await
    }

    /// Full control over collaborators and pipeline settings.
    pub async fn build(
        storyboards: ScriptedStoryboards,
        backend: ClipBackend,
        clip_secs: f64,
        configure: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let workspace = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::for_workspace(workspace.path());
        config.default_backend = BACKEND_ID.to_string();
        configure(&mut config);

        let registry = Arc::new(BackendRegistry::new());
        let backend = Arc::new(backend);
        registry.register(backend.clone()).await;

        let storyboards = Arc::new(storyboards);
        let assembler = Arc::new(RecordingAssembler::new(clip_secs));
        let broadcaster = Arc::new(ProgressBroadcaster::new());

        let orchestrator = Arc::new(Orchestrator::new(
            config,
            registry,
            storyboards.clone(),
            assembler.clone(),
            broadcaster.clone(),
        ));
        orchestrator.init().await.unwrap();

        Self {
            orchestrator,
            storyboards,
            backend,
            assembler,
            broadcaster,
            workspace,
        }
    }

    pub fn shot_path(&self, job_id: &str, shot_id: &str) -> PathBuf {
        self.orchestrator.layout().shot_path(job_id, shot_id)
    }
}

pub fn three_shots() -> Vec<(f64, f64)> {
    vec![(3.0, 0.0), (3.0, 0.0), (3.0, 0.0)]
}
