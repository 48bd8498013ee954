//! Turning the model's text reply into a [`Storyboard`].
//!
//! The model is asked for bare JSON but often wraps it in a Markdown code
//! fence. Missing shot fields fall back to defaults; the shot list is then
//! ordered, cut to the requested bound and renumbered `1..=N`, and finally
//! fitted to the total duration limit.

use std::collections::BTreeMap;

use clipforge_core::storyboard::{Shot, Storyboard, MAX_SHOT_DURATION_SECS};
use clipforge_core::types::prefixed_id;
use serde::Deserialize;

use super::claude::StoryboardGenerationError;

pub const DEFAULT_TITLE: &str = "Generated Video";

/// A shot cut down to fit the duration limit is dropped below this length.
const MIN_FITTED_SHOT_SECS: f64 = 1.0;

/// Values applied to shots the model left incomplete.
#[derive(Debug, Clone)]
pub struct ShotDefaults {
    pub duration_secs: f64,
    pub num_frames: u32,
    pub fps: u32,
}

#[derive(Debug, Deserialize)]
struct RawStoryboard {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    shots: Vec<RawShot>,
    #[serde(default)]
    style: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawShot {
    #[serde(default)]
    sequence_number: Option<u32>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    text_prompt: Option<String>,
    #[serde(default)]
    camera_movement: Option<String>,
    #[serde(default)]
    camera_angle: Option<String>,
    #[serde(default)]
    motion_intensity: Option<f64>,
}

/// Drop a surrounding ```` ``` ```` fence (and a `json` language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => {
            let inner = trimmed.trim_start_matches('`');
            let inner = inner.strip_suffix("```").unwrap_or(inner);
            return inner.trim().trim_start_matches("json").trim();
        }
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().trim_start_matches("json").trim()
}

pub fn parse_storyboard(
    text: &str,
    source_prompt: &str,
    max_shots: usize,
    max_duration_secs: f64,
    defaults: &ShotDefaults,
    generated_by: &str,
) -> Result<Storyboard, StoryboardGenerationError> {
    let json = strip_code_fence(text);
    let raw: RawStoryboard = serde_json::from_str(json).map_err(|e| {
        StoryboardGenerationError::Parse(format!("reply is not storyboard JSON: {e}"))
    })?;

    if raw.shots.is_empty() {
        return Err(StoryboardGenerationError::Parse(
            "reply contains no shots".into(),
        ));
    }

    let mut indexed: Vec<(u32, RawShot)> = raw
        .shots
        .into_iter()
        .enumerate()
        .map(|(i, shot)| (shot.sequence_number.unwrap_or(i as u32 + 1), shot))
        .collect();
    // Stable: ties keep the model's order.
    indexed.sort_by_key(|(seq, _)| *seq);
    indexed.truncate(max_shots.max(1));

    let shots = indexed
        .into_iter()
        .enumerate()
        .map(|(i, (_, raw))| build_shot(i as u32 + 1, raw, defaults))
        .collect();
    let shots = fit_duration(shots, max_duration_secs);

    let title = raw
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    Ok(Storyboard::new(title, source_prompt, shots, raw.style, generated_by))
}

/// Keep shots in order while their total fits in `max_secs`. The shot that
/// would cross the limit is shortened to the remainder, or dropped if that
/// leaves less than [`MIN_FITTED_SHOT_SECS`]; later shots are dropped. The
/// first shot is always kept. A non-positive limit disables fitting.
fn fit_duration(shots: Vec<Shot>, max_secs: f64) -> Vec<Shot> {
    if max_secs <= 0.0 {
        return shots;
    }
    let mut kept = Vec::with_capacity(shots.len());
    let mut total = 0.0;
    for mut shot in shots {
        let remaining = max_secs - total;
        if shot.duration_seconds > remaining {
            if kept.is_empty() || remaining >= MIN_FITTED_SHOT_SECS {
                shot.duration_seconds = remaining;
                kept.push(shot);
            }
            break;
        }
        total += shot.duration_seconds;
        kept.push(shot);
    }
    kept
}

fn build_shot(sequence_number: u32, raw: RawShot, defaults: &ShotDefaults) -> Shot {
    let description = raw.description.unwrap_or_default();
    let prompt = raw
        .text_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| description.clone());

    let duration = match raw.duration_seconds {
        Some(d) if d.is_finite() && d > 0.0 => d.min(MAX_SHOT_DURATION_SECS),
        _ => defaults.duration_secs,
    };

    let mut shot = Shot::new(prefixed_id("shot", 8), sequence_number, duration, description, prompt);
    if let Some(movement) = raw.camera_movement {
        shot.camera_movement = movement;
    }
    if let Some(angle) = raw.camera_angle {
        shot.camera_angle = angle;
    }
    if let Some(motion) = raw.motion_intensity.filter(|m| m.is_finite()) {
        shot.motion_intensity = motion.clamp(0.0, 1.0);
    }
    shot.num_frames = defaults.num_frames;
    shot.fps = defaults.fps;
    shot
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const MAX_SECS: f64 = 60.0;

    fn defaults() -> ShotDefaults {
        ShotDefaults {
            duration_secs: 3.0,
            num_frames: 81,
            fps: 8,
        }
    }

    const REPLY: &str = r#"{
      "title": "Fox at dawn",
      "shots": [
        {"sequence_number": 2, "duration_seconds": 4.0, "description": "Fox runs",
         "text_prompt": "a red fox running through snow, cinematic", "camera_movement": "pan"},
        {"sequence_number": 1, "duration_seconds": 2.5, "description": "Snowy field at dawn",
         "camera_angle": "high_angle", "motion_intensity": 0.2}
      ],
      "style": {"mood": "calm", "lighting": "soft"}
    }"#;

    #[test]
    fn fenced_reply_is_unwrapped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn single_line_fence_is_unwrapped() {
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");

        let reply = r#"```json {"shots": [{"description": "d"}]}```"#;
        let sb = parse_storyboard(reply, "p", 5, MAX_SECS, &defaults(), "claude").unwrap();
        assert_eq!(sb.shot_count(), 1);
    }

    #[test]
    fn shots_are_ordered_and_defaulted() {
        let sb = parse_storyboard(REPLY, "a fox", 5, MAX_SECS, &defaults(), "claude").unwrap();
        sb.validate().unwrap();

        assert_eq!(sb.title, "Fox at dawn");
        assert_eq!(sb.generated_by, "claude");
        assert_eq!(sb.source_prompt, "a fox");
        assert_eq!(sb.shot_count(), 2);
        assert_eq!(sb.total_duration_seconds, 6.5);

        let first = &sb.shots[0];
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.description, "Snowy field at dawn");
        // No text_prompt: falls back to the description.
        assert_eq!(first.generation_prompt, "Snowy field at dawn");
        assert_eq!(first.camera_movement, "static");
        assert_eq!(first.camera_angle, "high_angle");
        assert!(first.id.starts_with("shot_"));

        assert_eq!(sb.shots[1].camera_movement, "pan");
        assert_eq!(sb.style_tags["mood"], "calm");
    }

    #[test]
    fn shot_list_is_cut_and_renumbered() {
        let reply = r#"{"shots": [
            {"sequence_number": 4, "description": "d"},
            {"sequence_number": 9, "description": "e"},
            {"sequence_number": 7, "description": "f"}
        ]}"#;
        let sb = parse_storyboard(reply, "p", 2, MAX_SECS, &defaults(), "claude").unwrap();
        sb.validate().unwrap();
        assert_eq!(sb.title, DEFAULT_TITLE);
        let seqs: Vec<u32> = sb.shots.iter().map(|s| s.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
        let descs: Vec<&str> = sb.shots.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descs, vec!["d", "f"]);
        assert_eq!(sb.total_duration_seconds, 6.0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let reply = r#"{"shots": [
            {"duration_seconds": 25.0, "motion_intensity": 3.0, "description": "x"},
            {"duration_seconds": -1.0, "description": "y"}
        ]}"#;
        let sb = parse_storyboard(reply, "p", 5, MAX_SECS, &defaults(), "claude").unwrap();
        assert_eq!(sb.shots[0].duration_seconds, MAX_SHOT_DURATION_SECS);
        assert_eq!(sb.shots[0].motion_intensity, 1.0);
        assert_eq!(sb.shots[1].duration_seconds, 3.0);
    }

    #[test]
    fn total_duration_is_fitted_to_limit() {
        let shots: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"duration_seconds": 10.0, "description": "s{i}"}}"#))
            .collect();
        let reply = format!(r#"{{"shots": [{}]}}"#, shots.join(","));

        let sb = parse_storyboard(&reply, "p", 10, 60.0, &defaults(), "claude").unwrap();
        sb.validate().unwrap();
        assert_eq!(sb.shot_count(), 6);
        assert_eq!(sb.total_duration_seconds, 60.0);
    }

    #[test]
    fn shot_crossing_the_limit_is_shortened_or_dropped() {
        let reply = r#"{"shots": [
            {"duration_seconds": 4.0, "description": "a"},
            {"duration_seconds": 4.0, "description": "b"},
            {"duration_seconds": 4.0, "description": "c"}
        ]}"#;

        let sb = parse_storyboard(reply, "p", 5, 9.0, &defaults(), "claude").unwrap();
        let durations: Vec<f64> = sb.shots.iter().map(|s| s.duration_seconds).collect();
        assert_eq!(durations, vec![4.0, 4.0, 1.0]);

        let sb = parse_storyboard(reply, "p", 5, 8.5, &defaults(), "claude").unwrap();
        assert_eq!(sb.shot_count(), 2);
        assert_eq!(sb.total_duration_seconds, 8.0);

        let sb = parse_storyboard(reply, "p", 5, 2.0, &defaults(), "claude").unwrap();
        assert_eq!(sb.shot_count(), 1);
        assert_eq!(sb.shots[0].duration_seconds, 2.0);
    }

    #[test]
    fn malformed_or_empty_replies_fail() {
        assert_matches!(
            parse_storyboard("Sure! Here is your storyboard.", "p", 5, MAX_SECS, &defaults(), "claude"),
            Err(StoryboardGenerationError::Parse(_))
        );
        assert_matches!(
            parse_storyboard(r#"{"title": "t", "shots": []}"#, "p", 5, MAX_SECS, &defaults(), "claude"),
            Err(StoryboardGenerationError::Parse(_))
        );
    }
}
