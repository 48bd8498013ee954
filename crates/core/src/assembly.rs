//! Final video assembly: strategy selection, transition validation and
//! crossfade planning.
//!
//! Planning is pure and runs before the media tool is touched, so an
//! impossible transition is rejected as a validation error without any
//! subprocess being spawned.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Encode settings
// ---------------------------------------------------------------------------

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
pub const DEFAULT_CRF: u8 = 23;

/// Re-encode settings used when clips are blended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub codec: String,
    pub pixel_format: String,
    pub crf: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            crf: DEFAULT_CRF,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How the clips are joined.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyStrategy {
    /// Concat demuxer with stream copy.
    StreamCopy,
    /// Chained pairwise `xfade`, re-encoded.
    Crossfade { transition: f64 },
}

/// Pick the strategy for a clip count and transition duration.
///
/// A single clip never gets a transition.
pub fn determine_strategy(clip_count: usize, transition: f64) -> AssemblyStrategy {
    if clip_count <= 1 || transition <= 0.0 {
        AssemblyStrategy::StreamCopy
    } else {
        AssemblyStrategy::Crossfade { transition }
    }
}

// ---------------------------------------------------------------------------
// Validation and planning
// ---------------------------------------------------------------------------

/// The transition must be non-negative and, when positive, strictly shorter
/// than every clip.
pub fn validate_transition(transition: f64, durations: &[f64]) -> Result<(), CoreError> {
    if !transition.is_finite() || transition < 0.0 {
        return Err(CoreError::Validation(format!(
            "transition duration must be >= 0, got {transition}"
        )));
    }
    if transition == 0.0 || durations.len() <= 1 {
        return Ok(());
    }
    let shortest = durations.iter().copied().fold(f64::INFINITY, f64::min);
    if transition >= shortest {
        return Err(CoreError::Validation(format!(
            "transition duration {transition}s must be shorter than the shortest clip ({shortest}s)"
        )));
    }
    Ok(())
}

/// `xfade` offset for each adjacent pair.
///
/// The offset of pair `i` is the length of the output built so far minus the
/// transition: each clip up to `i` contributes `duration - transition`,
/// clamped at zero.
pub fn crossfade_offsets(durations: &[f64], transition: f64) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
    let mut acc = 0.0;
    for d in durations.iter().take(durations.len().saturating_sub(1)) {
        acc += (d - transition).max(0.0);
        offsets.push(acc);
    }
    offsets
}

/// Build the `-filter_complex` graph chaining every clip with `xfade`.
///
/// Intermediate outputs are labelled `[v0]`, `[v1]`, ... and the last one
/// `[outv]`.
pub fn build_xfade_filter(durations: &[f64], transition: f64) -> String {
    let offsets = crossfade_offsets(durations, transition);
    let last = offsets.len().saturating_sub(1);
    let mut parts = Vec::with_capacity(offsets.len());
    let mut current = "[0:v]".to_string();

    for (i, offset) in offsets.iter().enumerate() {
        let output = if i == last {
            "[outv]".to_string()
        } else {
            format!("[v{i}]")
        };
        parts.push(format!(
            "{current}[{}:v]xfade=transition=fade:duration={}:offset={}{output}",
            i + 1,
            fmt_secs(transition),
            fmt_secs(*offset),
        ));
        current = output;
    }
    parts.join(";")
}

/// Contents of a concat demuxer list file. Single quotes in paths are
/// escaped the way the demuxer expects.
pub fn concat_list_contents(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Output length for the given strategy.
pub fn planned_duration(durations: &[f64], strategy: &AssemblyStrategy) -> f64 {
    let total: f64 = durations.iter().sum();
    match strategy {
        AssemblyStrategy::StreamCopy => total,
        AssemblyStrategy::Crossfade { transition } => {
            total - durations.len().saturating_sub(1) as f64 * transition
        }
    }
}

/// Everything the media tool needs to render the final video.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyPlan {
    pub clips: Vec<PathBuf>,
    pub durations: Vec<f64>,
    pub strategy: AssemblyStrategy,
    pub planned_duration_seconds: f64,
}

/// Probe clip durations through the assembler and validate the transition.
pub async fn plan(
    assembler: &dyn MediaAssembler,
    clips: &[PathBuf],
    transition: f64,
) -> Result<AssemblyPlan, CoreError> {
    if clips.is_empty() {
        return Err(CoreError::Validation("no clips to assemble".into()));
    }

    let mut durations = Vec::with_capacity(clips.len());
    for clip in clips {
        durations.push(assembler.probe_duration(clip).await?);
    }

    validate_transition(transition, &durations)?;
    let strategy = determine_strategy(clips.len(), transition);

    Ok(AssemblyPlan {
        clips: clips.to_vec(),
        planned_duration_seconds: planned_duration(&durations, &strategy),
        durations,
        strategy,
    })
}

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Clip duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, CoreError>;

    /// Render a validated plan to `output`.
    async fn render(&self, plan: &AssemblyPlan, output: &Path) -> Result<(), CoreError>;
}

// ---- private helpers ----

/// Trim float noise so filter strings stay readable (`2.5`, not
/// `2.5000000000000004`).
fn fmt_secs(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
