//! Job record and its lifecycle state machine.
//!
//! All status changes go through the `mark_*` methods so that the
//! invariants hold for every persisted snapshot:
//!
//! - `output_path` is set iff the job is `Completed`;
//! - `error_message` is set iff the job is `Failed`;
//! - `progress_percentage` never decreases within an attempt.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::storyboard::Storyboard;
use crate::types::{prefixed_id, EntityId, Timestamp};

/// Retries allowed by default before a failed job stays failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Shot bound used when a request does not specify one.
pub const DEFAULT_MAX_SHOTS: usize = 5;

/// Hard bounds on the per-request shot count.
pub const MIN_SHOTS: usize = 1;
pub const MAX_SHOTS: usize = 10;

/// Step label of a job that has not started yet.
pub const STEP_INITIALIZING: &str = "initializing";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the lowercase wire form (used by list filters).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Allowed edges of the lifecycle graph. `Failed -> Queued` is the
    /// retry edge.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Queued, Failed)
                | (Processing, Failed)
                | (Queued, Cancelled)
                | (Processing, Cancelled)
                | (Failed, Queued)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    TextToVideo,
    ImageToVideo,
    VideoToVideo,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Validated inputs for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub prompt: String,
    pub backend_id: String,
    pub reference_image_path: Option<String>,
    pub max_shots: usize,
    pub generation_mode: Option<GenerationMode>,
    pub style_preferences: Option<serde_json::Value>,
}

/// One end-to-end generation request and its mutable run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: EntityId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    pub prompt: String,
    pub generation_mode: GenerationMode,
    pub backend_id: String,
    #[serde(default)]
    pub reference_image_path: Option<String>,
    #[serde(default = "default_max_shots")]
    pub max_shots: usize,
    #[serde(default)]
    pub style_preferences: Option<serde_json::Value>,

    #[serde(default)]
    pub storyboard: Option<Storyboard>,

    pub current_step: String,
    pub progress_percentage: f64,
    #[serde(default)]
    pub current_shot_id: Option<EntityId>,

    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub intermediate_outputs: Vec<String>,

    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_shots() -> usize {
    DEFAULT_MAX_SHOTS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Job {
    /// Build a queued job with a fresh id.
    ///
    /// The generation mode is image-to-video when a reference image is given
    /// unless the request names a mode explicitly.
    pub fn new(input: NewJob) -> Self {
        let now = chrono::Utc::now();
        let generation_mode = input.generation_mode.unwrap_or(
            if input.reference_image_path.is_some() {
                GenerationMode::ImageToVideo
            } else {
                GenerationMode::TextToVideo
            },
        );
        Self {
            id: prefixed_id("job", 12),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            prompt: input.prompt,
            generation_mode,
            backend_id: input.backend_id,
            reference_image_path: input.reference_image_path,
            max_shots: input.max_shots,
            style_preferences: input.style_preferences,
            storyboard: None,
            current_step: STEP_INITIALIZING.to_string(),
            progress_percentage: 0.0,
            current_shot_id: None,
            output_path: None,
            intermediate_outputs: Vec::new(),
            error_message: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }

    /// Record progress for the current step.
    ///
    /// The value is clamped to `[0, 100]` and never moves backwards, so a
    /// late or misbehaving report cannot make the observed sequence regress.
    pub fn update_progress(&mut self, step: impl Into<String>, percentage: f64) {
        let clamped = if percentage.is_finite() {
            percentage.clamp(0.0, 100.0)
        } else {
            self.progress_percentage
        };
        self.current_step = step.into();
        self.progress_percentage = self.progress_percentage.max(clamped);
        self.touch();
    }

    /// Enter `Processing`. Allowed from `Queued`, and from `Processing` when
    /// resuming an interrupted run.
    pub fn mark_processing(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing)?;
        self.error_message = None;
        self.touch();
        Ok(())
    }

    pub fn mark_completed(&mut self, output_path: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.output_path = Some(output_path.into());
        self.error_message = None;
        self.current_shot_id = None;
        self.current_step = "completed".to_string();
        self.progress_percentage = 100.0;
        self.touch();
        Ok(())
    }

    /// Enter `Failed`, keeping the progress reached so far.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.output_path = None;
        self.current_step = "failed".to_string();
        self.touch();
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Cancelled)?;
        self.output_path = None;
        self.current_step = "cancelled".to_string();
        self.touch();
        Ok(())
    }

    /// Put a failed job back in the queue for another attempt.
    ///
    /// The storyboard and intermediate outputs are kept so the next run can
    /// resume after the last completed shot.
    pub fn requeue_for_retry(&mut self) -> Result<(), CoreError> {
        if self.status != JobStatus::Failed {
            return Err(CoreError::Conflict(format!(
                "job {} is {} and cannot be retried",
                self.id, self.status
            )));
        }
        if self.retry_count >= self.max_retries {
            return Err(CoreError::Conflict(format!(
                "job {} has used all {} retries",
                self.id, self.max_retries
            )));
        }
        self.transition(JobStatus::Queued)?;
        self.retry_count += 1;
        self.error_message = None;
        self.progress_percentage = 0.0;
        self.current_step = "queued for retry".to_string();
        self.current_shot_id = None;
        self.touch();
        Ok(())
    }

    // ---- private helpers ----

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "job {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Validate request-level inputs that do not need any collaborator.
pub fn validate_new_job(input: &NewJob) -> Result<(), CoreError> {
    if input.prompt.trim().is_empty() {
        return Err(CoreError::Validation("prompt must not be empty".into()));
    }
    if !(MIN_SHOTS..=MAX_SHOTS).contains(&input.max_shots) {
        return Err(CoreError::Validation(format!(
            "max_shots must be between {MIN_SHOTS} and {MAX_SHOTS}, got {}",
            input.max_shots
        )));
    }
    if input.backend_id.trim().is_empty() {
        return Err(CoreError::Validation("backend_id must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn new_job() -> Job {
        Job::new(NewJob {
            prompt: "A sunrise over mountains".into(),
            backend_id: "fake".into(),
            reference_image_path: None,
            max_shots: 3,
            generation_mode: None,
            style_preferences: None,
        })
    }

    #[test]
    fn new_job_is_queued_at_zero() {
        let job = new_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress_percentage, 0.0);
        assert_eq!(job.current_step, STEP_INITIALIZING);
        assert_eq!(job.generation_mode, GenerationMode::TextToVideo);
        assert!(job.id.starts_with("job_"));
    }

    #[test]
    fn reference_image_selects_image_to_video() {
        let job = Job::new(NewJob {
            reference_image_path: Some("/tmp/ref.png".into()),
            ..base_input()
        });
        assert_eq!(job.generation_mode, GenerationMode::ImageToVideo);
    }

    #[test]
    fn explicit_mode_overrides_inference() {
        let job = Job::new(NewJob {
            reference_image_path: Some("/tmp/ref.png".into()),
            generation_mode: Some(GenerationMode::VideoToVideo),
            ..base_input()
        });
        assert_eq!(job.generation_mode, GenerationMode::VideoToVideo);
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = new_job();
        job.mark_processing().unwrap();
        job.update_progress("shots", 40.0);
        job.update_progress("shots", 30.0);
        assert_eq!(job.progress_percentage, 40.0);
        assert_eq!(job.current_step, "shots");
    }

    #[test]
    fn progress_is_clamped() {
        let mut job = new_job();
        job.update_progress("x", 150.0);
        assert_eq!(job.progress_percentage, 100.0);
        let mut job = new_job();
        job.update_progress("x", f64::NAN);
        assert_eq!(job.progress_percentage, 0.0);
    }

    #[test]
    fn completed_sets_output_and_full_progress() {
        let mut job = new_job();
        job.mark_processing().unwrap();
        job.mark_completed("/videos/final_output.mp4").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percentage, 100.0);
        assert!(job.output_path.is_some());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn completing_a_queued_job_is_a_conflict() {
        let mut job = new_job();
        assert_matches!(job.mark_completed("x"), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn failed_keeps_progress_and_sets_message() {
        let mut job = new_job();
        job.mark_processing().unwrap();
        job.update_progress("shots", 35.0);
        job.mark_failed("backend exploded").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress_percentage, 35.0);
        assert_eq!(job.error_message.as_deref(), Some("backend exploded"));
        assert!(job.output_path.is_none());
    }

    #[test]
    fn terminal_jobs_cannot_be_cancelled() {
        let mut job = new_job();
        job.mark_processing().unwrap();
        job.mark_completed("out.mp4").unwrap();
        assert_matches!(job.mark_cancelled(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn retry_requeues_failed_job() {
        let mut job = new_job();
        job.mark_processing().unwrap();
        job.update_progress("shots", 50.0);
        job.mark_failed("boom").unwrap();

        job.requeue_for_retry().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.progress_percentage, 0.0);
        assert!(job.error_message.is_none());
    }

    #[test]
    fn retry_exhausted_is_a_conflict() {
        let mut job = new_job();
        job.max_retries = 0;
        job.mark_processing().unwrap();
        job.mark_failed("boom").unwrap();
        assert_matches!(job.requeue_for_retry(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn retry_of_queued_job_is_a_conflict() {
        let mut job = new_job();
        assert_matches!(job.requeue_for_retry(), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn status_parse_accepts_wire_form() {
        assert_eq!(JobStatus::parse("failed"), Some(JobStatus::Failed));
        assert_eq!(JobStatus::parse("FAILED"), None);
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn validate_new_job_bounds() {
        assert!(validate_new_job(&base_input()).is_ok());
        assert_matches!(
            validate_new_job(&NewJob {
                prompt: "   ".into(),
                ..base_input()
            }),
            Err(CoreError::Validation(_))
        );
        assert!(validate_new_job(&NewJob {
            max_shots: 0,
            ..base_input()
        })
        .is_err());
        assert!(validate_new_job(&NewJob {
            max_shots: 11,
            ..base_input()
        })
        .is_err());
    }

    fn base_input() -> NewJob {
        NewJob {
            prompt: "A sunrise".into(),
            backend_id: "fake".into(),
            reference_image_path: None,
            max_shots: 3,
            generation_mode: None,
            style_preferences: None,
        }
    }
}
