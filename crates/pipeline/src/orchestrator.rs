//! Job lifecycle: create, execute, cancel, retry, delete.
//!
//! One execution drives four stages in order and persists the job after
//! every progress update:
//!
//! | Stage      | Progress  | Work                                   |
//! |------------|-----------|----------------------------------------|
//! | Start      | 0         | mark `processing`                      |
//! | Storyboard | 0 → 10    | prompt → shot list                     |
//! | Shots      | 10 → 85   | one backend call per shot, in order    |
//! | Assembly   | 85 → 95   | concat or crossfade into one file      |
//! | Finalize   | 95 → 100  | mark `completed`, record `output_path` |
//!
//! A job id can be executing at most once per process; the running map
//! also carries the cancellation token checked between stages and shots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clipforge_core::assembly::{self, MediaAssembler};
use clipforge_core::backend::ProgressReporter;
use clipforge_core::error::CoreError;
use clipforge_core::job::{
    validate_new_job, GenerationMode, Job, JobStatus, NewJob, DEFAULT_MAX_SHOTS,
};
use clipforge_core::layout::{check_id_component, relocate, FileLayout};
use clipforge_core::progress::{
    shot_base, shot_done, shot_progress, PROGRESS_ASSEMBLY, PROGRESS_FINALIZING,
    PROGRESS_START, PROGRESS_STORYBOARD_DONE, PROGRESS_STORYBOARD_IN_FLIGHT,
};
use clipforge_core::storyboard::{StoryboardGenerator, StoryboardRequest};
use clipforge_db::JobStore;
use clipforge_events::{ProgressBroadcaster, ProgressEvent};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::registry::BackendRegistry;

/// Callback invoked with every event published for the job being executed.
pub type ProgressObserver = dyn Fn(&ProgressEvent) + Send + Sync;

/// Inputs for [`Orchestrator::create`].
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub prompt: String,
    /// Falls back to the configured default backend.
    pub backend_id: Option<String>,
    pub reference_image_path: Option<String>,
    pub max_shots: usize,
    pub generation_mode: Option<GenerationMode>,
    pub style_preferences: Option<serde_json::Value>,
}

impl CreateJobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            backend_id: None,
            reference_image_path: None,
            max_shots: DEFAULT_MAX_SHOTS,
            generation_mode: None,
            style_preferences: None,
        }
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    layout: FileLayout,
    store: JobStore,
    registry: Arc<BackendRegistry>,
    storyboards: Arc<dyn StoryboardGenerator>,
    assembler: Arc<dyn MediaAssembler>,
    broadcaster: Arc<ProgressBroadcaster>,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<BackendRegistry>,
        storyboards: Arc<dyn StoryboardGenerator>,
        assembler: Arc<dyn MediaAssembler>,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Self {
        let layout = config.layout();
        let store = JobStore::new(&layout.jobs_root);
        Self {
            config,
            layout,
            store,
            registry,
            storyboards,
            assembler,
            broadcaster,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Create the workspace directories.
    pub async fn init(&self) -> Result<(), CoreError> {
        self.layout.ensure_dirs().await?;
        self.store.init().await?;
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn storyboards(&self) -> &Arc<dyn StoryboardGenerator> {
        &self.storyboards
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        lock(&self.running).contains_key(job_id)
    }

    pub fn running_count(&self) -> usize {
        lock(&self.running).len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Validate and persist a new queued job.
    pub async fn create(&self, request: CreateJobRequest) -> Result<Job, CoreError> {
        let backend_id = request
            .backend_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.config.default_backend.clone());

        let input = NewJob {
            prompt: request.prompt,
            backend_id,
            reference_image_path: request.reference_image_path,
            max_shots: request.max_shots,
            generation_mode: request.generation_mode,
            style_preferences: request.style_preferences,
        };
        validate_new_job(&input)?;

        if !self.registry.is_available(&input.backend_id).await {
            return Err(CoreError::Validation(format!(
                "Backend not available: {}",
                input.backend_id
            )));
        }

        if let Some(path) = &input.reference_image_path {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(CoreError::Validation(format!(
                    "Reference image not found: {path}"
                )));
            }
        }

        let job = Job::new(input);
        self.store.save(&job).await?;

        tracing::info!(
            job_id = %job.id,
            backend_id = %job.backend_id,
            mode = ?job.generation_mode,
            "Job created",
        );
        Ok(job)
    }

    /// Run a queued (or interrupted) job to completion.
    ///
    /// Returns the completed or cancelled job. On failure the job is
    /// persisted as `failed` and the stage error is returned.
    pub async fn execute(
        &self,
        job_id: &str,
        observer: Option<&ProgressObserver>,
    ) -> Result<Job, CoreError> {
        check_id_component(job_id)?;
        let slot = self.claim(job_id)?;

        let job = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        if job.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "job {job_id} is {} and cannot be executed",
                job.status
            )));
        }

        tracing::info!(job_id, attempt = job.retry_count + 1, "Job execution started");

        let mut run = Run {
            orch: self,
            job,
            observer,
            cancel: slot.token.clone(),
        };
        let outcome = run.drive().await;
        let mut job = run.job;

        match outcome {
            Ok(()) => {
                tracing::info!(job_id, output = ?job.output_path, "Job completed");
                Ok(job)
            }
            Err(Halt::Cancelled) => {
                job.current_shot_id = None;
                job.mark_cancelled()?;
                self.store.save(&job).await?;
                let event = ProgressEvent::job_cancelled(&job.id, job.progress_percentage);
                self.notify(&event, observer).await;
                tracing::info!(job_id, progress = job.progress_percentage, "Job cancelled");
                Ok(job)
            }
            Err(Halt::Failed(err)) => {
                tracing::error!(job_id, error = %err, step = %job.current_step, "Job failed");
                match job.mark_failed(err.to_string()) {
                    Ok(()) => {
                        if let Err(save_err) = self.store.save(&job).await {
                            tracing::error!(job_id, error = %save_err, "Failed to persist failed job");
                        }
                        let event =
                            ProgressEvent::error(&job.id, err.to_string(), job.progress_percentage);
                        self.notify(&event, observer).await;
                    }
                    Err(transition_err) => {
                        tracing::error!(job_id, error = %transition_err, "Could not mark job failed");
                    }
                }
                Err(err)
            }
        }
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, CoreError> {
        check_id_component(job_id)?;
        Ok(self.store.load(job_id).await?)
    }

    /// Every stored job, newest first.
    pub async fn list(&self) -> Result<Vec<Job>, CoreError> {
        let mut jobs = self.store.load_all().await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Remove a job record, its storyboard record and its artifacts.
    ///
    /// Returns `false` for an unknown id. A running job must be cancelled
    /// first.
    pub async fn delete(&self, job_id: &str) -> Result<bool, CoreError> {
        check_id_component(job_id)?;
        let _slot = self.claim(job_id).map_err(|_| {
            CoreError::Conflict(format!("job {job_id} is running; cancel it before deleting"))
        })?;

        let Some(job) = self.store.load(job_id).await? else {
            return Ok(false);
        };

        self.layout.cleanup_job(job_id).await?;
        if let Some(storyboard) = &job.storyboard {
            self.store.delete_storyboard(&storyboard.id).await?;
        }
        self.store.delete(job_id).await?;

        tracing::info!(job_id, "Job deleted");
        Ok(true)
    }

    /// Cancel a queued or processing job.
    ///
    /// An idle job is marked `cancelled` immediately. For a running job the
    /// cancellation is signalled and the current snapshot returned; the run
    /// stops at its next stage or shot boundary.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, CoreError> {
        check_id_component(job_id)?;

        let slot = match self.claim_or_signal(job_id) {
            Claim::Signalled => {
                tracing::info!(job_id, "Cancellation requested for running job");
                return self
                    .store
                    .load(job_id)
                    .await?
                    .ok_or_else(|| CoreError::job_not_found(job_id));
            }
            Claim::Idle(slot) => slot,
        };

        let mut job = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        if job.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "job {job_id} is already {}",
                job.status
            )));
        }

        job.mark_cancelled()?;
        self.store.save(&job).await?;
        drop(slot);

        let event = ProgressEvent::job_cancelled(&job.id, job.progress_percentage);
        self.notify(&event, None).await;
        tracing::info!(job_id, "Job cancelled");
        Ok(job)
    }

    /// Re-queue a failed job. The next execution resumes after the last
    /// shot whose artifact is still on disk.
    pub async fn retry(&self, job_id: &str) -> Result<Job, CoreError> {
        check_id_component(job_id)?;
        let _slot = self.claim(job_id)?;

        let mut job = self
            .store
            .load(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))?;
        job.requeue_for_retry()?;
        self.store.save(&job).await?;

        tracing::info!(job_id, retry_count = job.retry_count, "Job re-queued for retry");
        Ok(job)
    }

    /// Jobs left queued or processing by a previous process.
    pub async fn resumable_jobs(&self) -> Result<Vec<Job>, CoreError> {
        let mut jobs: Vec<Job> = self
            .list()
            .await?
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Processing))
            .filter(|j| !self.is_running(&j.id))
            .collect();
        jobs.reverse();
        Ok(jobs)
    }

    // ---- private helpers ----

    fn claim(&self, job_id: &str) -> Result<RunSlot<'_>, CoreError> {
        let mut running = lock(&self.running);
        if running.contains_key(job_id) {
            return Err(CoreError::Conflict(format!("job {job_id} is already running")));
        }
        let token = CancellationToken::new();
        running.insert(job_id.to_string(), token.clone());
        Ok(RunSlot {
            running: &self.running,
            job_id: job_id.to_string(),
            token,
        })
    }

    fn claim_or_signal(&self, job_id: &str) -> Claim<'_> {
        let mut running = lock(&self.running);
        if let Some(token) = running.get(job_id) {
            token.cancel();
            return Claim::Signalled;
        }
        let token = CancellationToken::new();
        running.insert(job_id.to_string(), token.clone());
        Claim::Idle(RunSlot {
            running: &self.running,
            job_id: job_id.to_string(),
            token,
        })
    }

    async fn notify(&self, event: &ProgressEvent, observer: Option<&ProgressObserver>) {
        self.broadcaster.publish(&event.job_id, event).await;
        if let Some(observer) = observer {
            observer(event);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry in the running map, removed on drop.
struct RunSlot<'a> {
    running: &'a Mutex<HashMap<String, CancellationToken>>,
    job_id: String,
    token: CancellationToken,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        lock(self.running).remove(&self.job_id);
    }
}

enum Claim<'a> {
    Signalled,
    Idle(RunSlot<'a>),
}

/// Why a run stopped early.
enum Halt {
    Cancelled,
    Failed(CoreError),
}

impl From<CoreError> for Halt {
    fn from(err: CoreError) -> Self {
        Halt::Failed(err)
    }
}

// ---------------------------------------------------------------------------
// One execution attempt
// ---------------------------------------------------------------------------

struct Run<'a> {
    orch: &'a Orchestrator,
    job: Job,
    observer: Option<&'a ProgressObserver>,
    cancel: CancellationToken,
}

impl Run<'_> {
    async fn drive(&mut self) -> Result<(), Halt> {
        self.job.mark_processing()?;
        self.emit("Starting video generation", PROGRESS_START).await?;

        self.checkpoint()?;
        self.storyboard_stage().await?;

        self.checkpoint()?;
        self.shot_stage().await?;

        self.checkpoint()?;
        let output = self.assembly_stage().await?;

        self.emit("Finalizing", PROGRESS_FINALIZING).await?;
        let output = output.display().to_string();
        self.job.mark_completed(output.clone())?;
        self.orch.store.save(&self.job).await.map_err(CoreError::from)?;
        self.publish(ProgressEvent::job_complete(&self.job.id, output)).await;
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn storyboard_stage(&mut self) -> Result<(), Halt> {
        if self.job.storyboard.is_some() {
            tracing::debug!(job_id = %self.job.id, "Reusing existing storyboard");
            self.emit("Storyboard generated", PROGRESS_STORYBOARD_DONE).await?;
            return Ok(());
        }

        self.emit("Generating storyboard", PROGRESS_STORYBOARD_IN_FLIGHT).await?;

        let config = &self.orch.config;
        let request = StoryboardRequest {
            prompt: self.job.prompt.clone(),
            max_shots: config.storyboard_shot_limit(self.job.max_shots),
            max_duration_secs: config.max_video_duration_secs,
            style_preferences: self.job.style_preferences.clone(),
        };

        let mut storyboard =
            match timeout(config.storyboard_timeout, self.orch.storyboards.generate(&request)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(CoreError::collaborator(
                        "storyboard generation",
                        format!("timed out after {:?}", config.storyboard_timeout),
                    )
                    .into())
                }
            };
        storyboard.validate()?;

        for shot in &mut storyboard.shots {
            shot.backend_id = self.job.backend_id.clone();
            if shot.sequence_number == 1 && self.job.reference_image_path.is_some() {
                shot.reference_image_path = self.job.reference_image_path.clone();
            }
        }

        self.orch
            .store
            .save_storyboard(&storyboard)
            .await
            .map_err(CoreError::from)?;

        tracing::info!(
            job_id = %self.job.id,
            storyboard_id = %storyboard.id,
            shots = storyboard.shot_count(),
            generated_by = %storyboard.generated_by,
            "Storyboard attached",
        );
        self.job.storyboard = Some(storyboard);
        self.emit("Storyboard generated", PROGRESS_STORYBOARD_DONE).await?;
        Ok(())
    }

    async fn shot_stage(&mut self) -> Result<(), Halt> {
        let shot_count = self.storyboard()?.shots.len();

        for index in 0..shot_count {
            self.checkpoint()?;
            let shot = self.storyboard()?.shots[index].clone();
            let label = format!("shot {}/{}", index + 1, shot_count);

            if let Some(existing) = &shot.output_path {
                if tokio::fs::try_exists(existing).await.unwrap_or(false) {
                    tracing::debug!(job_id = %self.job.id, shot_id = %shot.id, "Shot already generated, skipping");
                    if !self.job.intermediate_outputs.contains(existing) {
                        self.job.intermediate_outputs.push(existing.clone());
                    }
                    self.emit(format!("Skipping {label}, already generated"), shot_done(index, shot_count))
                        .await?;
                    continue;
                }
            }

            let backend = self.orch.registry.get(&shot.backend_id).await.ok_or_else(|| {
                CoreError::Configuration(format!("no backend registered for {}", shot.backend_id))
            })?;

            self.job.current_shot_id = Some(shot.id.clone());
            self.emit(format!("Generating {label}"), shot_base(index, shot_count))
                .await?;

            let work_dir = self.orch.layout.job_temp_dir(&self.job.id);
            let (reporter, mut updates) = ProgressReporter::channel();
            let shot_timeout = self.orch.config.shot_timeout;
            let generation = timeout(shot_timeout, backend.generate(&shot, &work_dir, &reporter));
            tokio::pin!(generation);

            let outcome = loop {
                tokio::select! {
                    outcome = &mut generation => break outcome,
                    Some(update) = updates.recv() => {
                        self.emit(
                            format!("{label}: {}", update.message),
                            shot_progress(index, shot_count, update.percent),
                        )
                        .await?;
                    }
                }
            };
            while let Ok(update) = updates.try_recv() {
                self.emit(
                    format!("{label}: {}", update.message),
                    shot_progress(index, shot_count, update.percent),
                )
                .await?;
            }

            let result = match outcome {
                Err(_) => {
                    return Err(CoreError::collaborator(
                        "shot generation",
                        format!("{label} timed out after {shot_timeout:?}"),
                    )
                    .into())
                }
                Ok(result) => result.map_err(CoreError::from)?,
            };
            if !result.success {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "backend reported failure without a message".to_string());
                return Err(CoreError::collaborator("shot generation", format!("{label}: {message}")).into());
            }
            let produced = result.output_path.ok_or_else(|| {
                CoreError::collaborator("shot generation", format!("{label}: no output file"))
            })?;

            let canonical = self.orch.layout.shot_path(&self.job.id, &shot.id);
            relocate(&produced, &canonical).await?;
            let canonical = canonical.display().to_string();

            if let Some(storyboard) = self.job.storyboard.as_mut() {
                let stored = &mut storyboard.shots[index];
                stored.output_path = Some(canonical.clone());
                stored.generation_time_seconds = Some(result.generation_time_seconds);
            }
            if !self.job.intermediate_outputs.contains(&canonical) {
                self.job.intermediate_outputs.push(canonical.clone());
            }

            tracing::info!(
                job_id = %self.job.id,
                shot_id = %shot.id,
                secs = result.generation_time_seconds,
                "Shot generated",
            );
            self.emit(format!("Completed {label}"), shot_done(index, shot_count))
                .await?;
            let event = ProgressEvent::shot_complete(
                &self.job.id,
                &shot.id,
                canonical,
                self.job.progress_percentage,
            );
            self.publish(event).await;
        }

        self.job.current_shot_id = None;
        self.emit("All shots generated", PROGRESS_ASSEMBLY).await?;
        Ok(())
    }

    async fn assembly_stage(&mut self) -> Result<PathBuf, Halt> {
        self.emit("Combining videos", PROGRESS_ASSEMBLY).await?;

        let storyboard = self.storyboard()?;
        let clips = storyboard
            .shots
            .iter()
            .map(|s| {
                s.output_path.as_ref().map(PathBuf::from).ok_or_else(|| {
                    CoreError::Internal(format!("shot {} has no output at assembly", s.id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let transition = storyboard.assembly_transition();

        let output = self.orch.layout.final_output_path(&self.job.id);
        let assembler = self.orch.assembler.as_ref();
        let assembly_timeout = self.orch.config.assembly_timeout;

        let assembled = timeout(assembly_timeout, async {
            let plan = assembly::plan(assembler, &clips, transition).await?;
            assembler.render(&plan, &output).await?;
            Ok::<_, CoreError>(plan)
        })
        .await;

        let plan = match assembled {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::collaborator(
                    "assembly",
                    format!("timed out after {assembly_timeout:?}"),
                )
                .into())
            }
        };

        tracing::info!(
            job_id = %self.job.id,
            clips = plan.clips.len(),
            duration = plan.planned_duration_seconds,
            strategy = ?plan.strategy,
            "Assembled final video",
        );
        Ok(output)
    }

    fn storyboard(&self) -> Result<&clipforge_core::storyboard::Storyboard, CoreError> {
        self.job
            .storyboard
            .as_ref()
            .ok_or_else(|| CoreError::Internal(format!("job {} has no storyboard", self.job.id)))
    }

    /// Record progress, persist, and publish a progress event.
    async fn emit(&mut self, step: impl Into<String>, percent: f64) -> Result<(), CoreError> {
        self.job.update_progress(step, percent);
        self.orch.store.save(&self.job).await?;

        let mut event = ProgressEvent::progress(
            &self.job.id,
            &self.job.current_step,
            self.job.progress_percentage,
        );
        if let Some(shot_id) = &self.job.current_shot_id {
            event = event.with_shot(shot_id);
        }
        tracing::debug!(
            job_id = %self.job.id,
            step = %self.job.current_step,
            progress = self.job.progress_percentage,
            "Progress",
        );
        self.publish(event).await;
        Ok(())
    }

    async fn publish(&self, event: ProgressEvent) {
        self.orch.notify(&event, self.observer).await;
    }
}
