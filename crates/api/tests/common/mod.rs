//! Shared helpers for API integration tests: scripted collaborators and a
//! router wired the same way as `main.rs`.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use clipforge_core::assembly::{AssemblyPlan, MediaAssembler};
use clipforge_core::backend::{
    BackendCapabilities, BackendError, GenerationResult, ProgressReporter, ShotBackend,
};
use clipforge_core::error::CoreError;
use clipforge_core::storyboard::{Shot, Storyboard, StoryboardGenerator, StoryboardRequest};
use clipforge_events::ProgressBroadcaster;
use clipforge_pipeline::{BackendRegistry, Orchestrator, PipelineConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use clipforge_api::config::ServerConfig;
use clipforge_api::engine::JobRunner;
use clipforge_api::router::build_app_router;
use clipforge_api::state::AppState;
use clipforge_api::ws::WsManager;

pub const BACKEND_ID: &str = "fake:clips";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_concurrent_jobs: 2,
        backend_refresh_secs: 60,
        ws_heartbeat_secs: 30,
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Three 3-second shots for every prompt.
pub struct FixedStoryboards;

#[async_trait]
impl StoryboardGenerator for FixedStoryboards {
    fn name(&self) -> &str {
        "fixed"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, request: &StoryboardRequest) -> Result<Storyboard, CoreError> {
        let shots = (1..=request.max_shots.min(3))
            .map(|i| {
                Shot::new(
                    format!("shot_{i}"),
                    i as u32,
                    3.0,
                    format!("Shot {i}"),
                    format!("{} #{i}", request.prompt),
                )
            })
            .collect();
        Ok(Storyboard::new(
            "Fixed",
            request.prompt.clone(),
            shots,
            BTreeMap::new(),
            "fixed",
        ))
    }
}

/// Writes the shot prompt to a file. With a gate, every call waits for a
/// permit first.
pub struct ClipBackend {
    pub gate: Option<Arc<Semaphore>>,
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
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| BackendError::Generation(e.to_string()))?
                .forget();
        }
        progress.report("Sampling", 50.0);

        tokio::fs::create_dir_all(work_dir).await?;
        let path = work_dir.join(format!("{}.partial.mp4", shot.id));
        tokio::fs::write(&path, shot.generation_prompt.as_bytes()).await?;
        Ok(GenerationResult::succeeded(path, 0.1))
    }
}

/// Every clip probes as 3 seconds; the render writes `final`.
pub struct StubAssembler;

#[async_trait]
impl MediaAssembler for StubAssembler {
    async fn probe_duration(&self, _path: &Path) -> Result<f64, CoreError> {
        Ok(3.0)
    }

    async fn render(&self, _plan: &AssemblyPlan, output: &Path) -> Result<(), CoreError> {
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
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub workspace: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Shot generation blocks until a permit is added to `gate`.
    pub async fn gated(gate: Arc<Semaphore>) -> Self {
        Self::build(Some(gate)).await
    }

    async fn build(gate: Option<Arc<Semaphore>>) -> Self {
        let workspace = tempfile::tempdir().unwrap();
        let mut pipeline_config = PipelineConfig::for_workspace(workspace.path());
        pipeline_config.default_backend = BACKEND_ID.to_string();

        let registry = Arc::new(BackendRegistry::new());
        registry.register(Arc::new(ClipBackend { gate })).await;

        let orchestrator = Arc::new(Orchestrator::new(
            pipeline_config,
            registry,
            Arc::new(FixedStoryboards),
            Arc::new(StubAssembler),
            Arc::new(ProgressBroadcaster::new()),
        ));
        orchestrator.init().await.unwrap();

        let config = test_config();
        let state = AppState {
            config: Arc::new(config.clone()),
            orchestrator: Arc::clone(&orchestrator),
            runner: Arc::new(JobRunner::new(orchestrator, config.max_concurrent_jobs)),
            ws_manager: Arc::new(WsManager::new()),
        };
        let router = build_app_router(state.clone(), &config);

        Self {
            router,
            state,
            workspace,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, Body::empty(), None).await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(Method::DELETE, uri, Body::empty(), None).await
    }

    pub async fn post_empty(&self, uri: &str) -> Response<Body> {
        self.send(Method::POST, uri, Body::empty(), None).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Method::POST,
            uri,
            Body::from(body.to_string()),
            Some("application/json"),
        )
        .await
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        self.router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    /// Create a job and return its JSON document.
    pub async fn create_job(&self, prompt: &str) -> Value {
        let response = self
            .post_json("/api/v1/jobs", serde_json::json!({ "prompt": prompt, "max_shots": 3 }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"].clone()
    }

    /// Poll until the job reaches `status` or five seconds pass.
    pub async fn wait_for_status(&self, job_id: &str, status: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = body_json(self.get(&format!("/api/v1/jobs/{job_id}")).await).await["data"]
                .clone();
            if job["status"] == status {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} never reached {status}: {job}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
