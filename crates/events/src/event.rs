//! Progress event payload pushed to job observers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    Progress,
    ShotComplete,
    JobComplete,
    JobCancelled,
    Error,
}

/// One progress notification for a job.
///
/// Absent optional fields are omitted from the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: ProgressEventType,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn bare(event_type: ProgressEventType, job_id: impl Into<String>) -> Self {
        Self {
            event_type,
            job_id: job_id.into(),
            step: None,
            progress: None,
            shot_id: None,
            message: None,
            output_path: None,
            error: None,
        }
    }

    pub fn progress(job_id: impl Into<String>, step: impl Into<String>, progress: f64) -> Self {
        Self {
            step: Some(step.into()),
            progress: Some(progress),
            ..Self::bare(ProgressEventType::Progress, job_id)
        }
    }

    pub fn shot_complete(
        job_id: impl Into<String>,
        shot_id: impl Into<String>,
        output_path: impl Into<String>,
        progress: f64,
    ) -> Self {
        Self {
            shot_id: Some(shot_id.into()),
            output_path: Some(output_path.into()),
            progress: Some(progress),
            ..Self::bare(ProgressEventType::ShotComplete, job_id)
        }
    }

    pub fn job_complete(job_id: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            output_path: Some(output_path.into()),
            progress: Some(100.0),
            message: Some("Video generation complete".to_string()),
            ..Self::bare(ProgressEventType::JobComplete, job_id)
        }
    }

    pub fn job_cancelled(job_id: impl Into<String>, progress: f64) -> Self {
        Self {
            progress: Some(progress),
            message: Some("Job cancelled".to_string()),
            ..Self::bare(ProgressEventType::JobCancelled, job_id)
        }
    }

    pub fn error(job_id: impl Into<String>, error: impl Into<String>, progress: f64) -> Self {
        Self {
            error: Some(error.into()),
            progress: Some(progress),
            ..Self::bare(ProgressEventType::Error, job_id)
        }
    }

    /// Attach the shot currently being worked on.
    pub fn with_shot(mut self, shot_id: impl Into<String>) -> Self {
        self.shot_id = Some(shot_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_omits_absent_fields() {
        let json = serde_json::to_value(ProgressEvent::progress("job_1", "Combining videos", 85.0))
            .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "progress",
                "job_id": "job_1",
                "step": "Combining videos",
                "progress": 85.0
            })
        );
    }

    #[test]
    fn type_tags_are_snake_case() {
        let shot = serde_json::to_value(ProgressEvent::shot_complete("j", "s", "/v/s.mp4", 35.0))
            .unwrap();
        assert_eq!(shot["type"], "shot_complete");

        let cancelled = serde_json::to_value(ProgressEvent::job_cancelled("j", 40.0)).unwrap();
        assert_eq!(cancelled["type"], "job_cancelled");
    }

    #[test]
    fn error_event_carries_error_and_progress() {
        let event = ProgressEvent::error("j", "shot generation failed: boom", 35.0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["error"], "shot generation failed: boom");
        assert_eq!(json["progress"], 35.0);
        assert!(json.get("output_path").is_none());
    }
}
