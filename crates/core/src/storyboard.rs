//! Storyboard and shot models, plus the storyboard collaborator interface.
//!
//! A [`Storyboard`] is the ordered shot plan produced once per job. Shots
//! are mutated in place as their clips are generated and are never removed
//! independently of their storyboard.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{EntityId, Timestamp};

// ---------------------------------------------------------------------------
// Limits and defaults
// ---------------------------------------------------------------------------

/// Upper bound (inclusive) on a single shot's duration in seconds.
pub const MAX_SHOT_DURATION_SECS: f64 = 10.0;

pub const DEFAULT_NUM_FRAMES: u32 = 81;
pub const DEFAULT_FPS: u32 = 8;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 6.0;
pub const DEFAULT_INFERENCE_STEPS: u32 = 25;
pub const DEFAULT_MOTION_INTENSITY: f64 = 0.5;

fn default_camera_movement() -> String {
    "static".to_string()
}

fn default_camera_angle() -> String {
    "eye_level".to_string()
}

fn default_motion_intensity() -> f64 {
    DEFAULT_MOTION_INTENSITY
}

fn default_num_frames() -> u32 {
    DEFAULT_NUM_FRAMES
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_inference_steps() -> u32 {
    DEFAULT_INFERENCE_STEPS
}

// ---------------------------------------------------------------------------
// Shot
// ---------------------------------------------------------------------------

/// Transition applied in the gap after a shot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    #[default]
    Cut,
    Fade,
    Dissolve,
    Wipe,
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub id: EntityId,
    pub sequence_number: u32,
    pub duration_seconds: f64,
    pub description: String,
    pub generation_prompt: String,

    // Conditioning inputs
    #[serde(default)]
    pub reference_image_path: Option<String>,
    #[serde(default)]
    pub first_frame_path: Option<String>,
    #[serde(default)]
    pub last_frame_path: Option<String>,

    // Camera hints
    #[serde(default = "default_camera_movement")]
    pub camera_movement: String,
    #[serde(default = "default_camera_angle")]
    pub camera_angle: String,
    #[serde(default = "default_motion_intensity")]
    pub motion_intensity: f64,

    // Generation parameters
    #[serde(default)]
    pub backend_id: String,
    #[serde(default = "default_num_frames")]
    pub num_frames: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default)]
    pub seed: Option<u64>,

    // Transition into the next shot
    #[serde(default)]
    pub transition_type: TransitionType,
    #[serde(default)]
    pub transition_duration: f64,

    // Output
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub generation_time_seconds: Option<f64>,
}

impl Shot {
    /// Build a shot with default generation parameters.
    pub fn new(
        id: impl Into<EntityId>,
        sequence_number: u32,
        duration_seconds: f64,
        description: impl Into<String>,
        generation_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sequence_number,
            duration_seconds,
            description: description.into(),
            generation_prompt: generation_prompt.into(),
            reference_image_path: None,
            first_frame_path: None,
            last_frame_path: None,
            camera_movement: default_camera_movement(),
            camera_angle: default_camera_angle(),
            motion_intensity: DEFAULT_MOTION_INTENSITY,
            backend_id: String::new(),
            num_frames: DEFAULT_NUM_FRAMES,
            fps: DEFAULT_FPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            seed: None,
            transition_type: TransitionType::Cut,
            transition_duration: 0.0,
            output_path: None,
            generation_time_seconds: None,
        }
    }

    /// Validate per-shot bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::Validation("shot id must not be empty".into()));
        }
        if self.sequence_number < 1 {
            return Err(CoreError::Validation(format!(
                "shot {} has sequence_number 0; numbering starts at 1",
                self.id
            )));
        }
        if !self.duration_seconds.is_finite()
            || self.duration_seconds <= 0.0
            || self.duration_seconds > MAX_SHOT_DURATION_SECS
        {
            return Err(CoreError::Validation(format!(
                "shot {} duration must be in (0, {MAX_SHOT_DURATION_SECS}], got {}",
                self.id, self.duration_seconds
            )));
        }
        if !self.transition_duration.is_finite() || self.transition_duration < 0.0 {
            return Err(CoreError::Validation(format!(
                "shot {} transition_duration must be >= 0, got {}",
                self.id, self.transition_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.motion_intensity) {
            return Err(CoreError::Validation(format!(
                "shot {} motion_intensity must be between 0.0 and 1.0, got {}",
                self.id, self.motion_intensity
            )));
        }
        if self.fps == 0 || self.num_frames == 0 {
            return Err(CoreError::Validation(format!(
                "shot {} needs a positive frame count and frame rate",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storyboard
// ---------------------------------------------------------------------------

/// Ordered generation plan for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub id: EntityId,
    pub title: String,
    pub source_prompt: String,
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub style_tags: BTreeMap<String, serde_json::Value>,
    pub total_duration_seconds: f64,
    pub generated_at: Timestamp,
    pub generated_by: String,
}

impl Storyboard {
    /// Assemble a storyboard, ordering shots by sequence number and
    /// computing the total duration. Call [`validate`](Self::validate)
    /// before accepting it.
    pub fn new(
        title: impl Into<String>,
        source_prompt: impl Into<String>,
        mut shots: Vec<Shot>,
        style_tags: BTreeMap<String, serde_json::Value>,
        generated_by: impl Into<String>,
    ) -> Self {
        shots.sort_by_key(|s| s.sequence_number);
        let total_duration_seconds = shots.iter().map(|s| s.duration_seconds).sum();
        Self {
            id: crate::types::prefixed_id("storyboard", 8),
            title: title.into(),
            source_prompt: source_prompt.into(),
            shots,
            style_tags,
            total_duration_seconds,
            generated_at: chrono::Utc::now(),
            generated_by: generated_by.into(),
        }
    }

    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    /// Sum of shot durations, not counting transitions.
    pub fn shots_duration(&self) -> f64 {
        self.shots.iter().map(|s| s.duration_seconds).sum()
    }

    /// Duration including every transition gap except after the last shot.
    pub fn duration_with_transitions(&self) -> f64 {
        let gaps: f64 = self
            .shots
            .iter()
            .take(self.shots.len().saturating_sub(1))
            .map(|s| s.transition_duration)
            .sum();
        self.shots_duration() + gaps
    }

    /// Transition duration applied uniformly to every gap during assembly.
    ///
    /// Taken from the first shot; zero when there are no shots.
    pub fn assembly_transition(&self) -> f64 {
        self.shots.first().map(|s| s.transition_duration).unwrap_or(0.0)
    }

    /// Check the structural invariants of an accepted storyboard.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.shots.is_empty() {
            return Err(CoreError::Validation(
                "storyboard must contain at least one shot".into(),
            ));
        }
        for shot in &self.shots {
            shot.validate()?;
        }
        validate_sequence_numbers(&self.shots)?;

        let expected = self.shots_duration();
        if (self.total_duration_seconds - expected).abs() > 1e-6 {
            return Err(CoreError::Validation(format!(
                "total_duration_seconds {} does not match shot durations {expected}",
                self.total_duration_seconds
            )));
        }
        Ok(())
    }
}

/// Sequence numbers must be exactly `1..=N` in order, with no gaps or
/// duplicates.
pub fn validate_sequence_numbers(shots: &[Shot]) -> Result<(), CoreError> {
    for (index, shot) in shots.iter().enumerate() {
        let expected = index as u32 + 1;
        if shot.sequence_number != expected {
            return Err(CoreError::Validation(format!(
                "shot sequence numbers must be contiguous from 1; position {} has {}",
                expected, shot.sequence_number
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

/// Input to a storyboard generator.
#[derive(Debug, Clone)]
pub struct StoryboardRequest {
    pub prompt: String,
    pub max_shots: usize,
    /// Upper bound on the summed shot durations.
    pub max_duration_secs: f64,
    pub style_preferences: Option<serde_json::Value>,
}

/// Turns a prompt into a validated [`Storyboard`].
#[async_trait]
pub trait StoryboardGenerator: Send + Sync {
    /// Recorded as [`Storyboard::generated_by`].
    fn name(&self) -> &str;

    /// Whether the generator is configured (API key present, etc.).
    fn is_available(&self) -> bool;

    async fn generate(&self, request: &StoryboardRequest) -> Result<Storyboard, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn shots(durations: &[f64]) -> Vec<Shot> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| Shot::new(format!("shot_{i}"), i as u32 + 1, *d, "desc", "prompt"))
            .collect()
    }

    #[test]
    fn new_sorts_shots_and_sums_duration() {
        let mut list = shots(&[3.0, 2.0, 4.0]);
        list.swap(0, 2);
        let board = Storyboard::new("t", "p", list, BTreeMap::new(), "test");

        let order: Vec<u32> = board.shots.iter().map(|s| s.sequence_number).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!((board.total_duration_seconds - 9.0).abs() < 1e-9);
        assert!(board.validate().is_ok());
    }

    #[test]
    fn empty_storyboard_is_rejected() {
        let board = Storyboard::new("t", "p", vec![], BTreeMap::new(), "test");
        assert_matches!(board.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn gap_in_sequence_numbers_is_rejected() {
        let mut list = shots(&[3.0, 3.0]);
        list[1].sequence_number = 3;
        let board = Storyboard::new("t", "p", list, BTreeMap::new(), "test");
        assert_matches!(board.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn duplicate_sequence_numbers_are_rejected() {
        let mut list = shots(&[3.0, 3.0]);
        list[1].sequence_number = 1;
        assert!(validate_sequence_numbers(&list).is_err());
    }

    #[test]
    fn sequence_starting_at_two_is_rejected() {
        let mut list = shots(&[3.0]);
        list[0].sequence_number = 2;
        assert!(validate_sequence_numbers(&list).is_err());
    }

    #[test]
    fn shot_duration_bounds() {
        let mut shot = Shot::new("s", 1, 10.0, "d", "p");
        assert!(shot.validate().is_ok());
        shot.duration_seconds = 10.5;
        assert!(shot.validate().is_err());
        shot.duration_seconds = 0.0;
        assert!(shot.validate().is_err());
        shot.duration_seconds = f64::NAN;
        assert!(shot.validate().is_err());
    }

    #[test]
    fn negative_transition_is_rejected() {
        let mut shot = Shot::new("s", 1, 3.0, "d", "p");
        shot.transition_duration = -0.5;
        assert!(shot.validate().is_err());
    }

    #[test]
    fn mismatched_total_duration_is_rejected() {
        let mut board = Storyboard::new("t", "p", shots(&[3.0, 3.0]), BTreeMap::new(), "test");
        board.total_duration_seconds = 7.0;
        assert!(board.validate().is_err());
    }

    #[test]
    fn duration_with_transitions_skips_last_gap() {
        let mut list = shots(&[3.0, 3.0, 3.0]);
        for shot in &mut list {
            shot.transition_duration = 0.5;
        }
        let board = Storyboard::new("t", "p", list, BTreeMap::new(), "test");
        assert!((board.duration_with_transitions() - 10.0).abs() < 1e-9);
        assert!((board.assembly_transition() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn shot_deserializes_with_defaults() {
        let json = r#"{
            "id": "shot_1",
            "sequence_number": 1,
            "duration_seconds": 3.0,
            "description": "A forest",
            "generation_prompt": "A forest at dawn"
        }"#;
        let shot: Shot = serde_json::from_str(json).unwrap();
        assert_eq!(shot.fps, DEFAULT_FPS);
        assert_eq!(shot.num_frames, DEFAULT_NUM_FRAMES);
        assert_eq!(shot.transition_type, TransitionType::Cut);
        assert_eq!(shot.camera_movement, "static");
        assert!(shot.output_path.is_none());
    }

    #[test]
    fn transition_type_serializes_lowercase() {
        let json = serde_json::to_string(&TransitionType::Dissolve).unwrap();
        assert_eq!(json, "\"dissolve\"");
    }
}
