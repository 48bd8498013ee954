//! Prompt text sent to the storyboard model.

use clipforge_core::storyboard::StoryboardRequest;

pub const STORYBOARD_SYSTEM_PROMPT: &str = r#"You are a professional film director and cinematographer. Your task is to create detailed storyboards for AI video generation.

Given a user's video description, you will:
1. Break down the concept into individual shots (typically 3-7 shots)
2. For each shot, provide:
   - A clear description of what happens
   - A detailed text prompt optimized for AI video generation
   - Camera movement and angle
   - Duration (typically 2-4 seconds per shot)
   - Motion intensity (0.0 = static, 1.0 = high motion)

Guidelines:
- Keep shots short (2-4 seconds) for best AI generation quality
- Each shot should have ONE clear focus/action
- Use descriptive, visual language in prompts
- Specify camera movements (pan, zoom, dolly, static)
- Consider continuity between shots
- Optimize prompts for AI (avoid complex compositions)

Output ONLY valid JSON in this exact format:
{
  "title": "Brief title for the video",
  "shots": [
    {
      "sequence_number": 1,
      "duration_seconds": 3.0,
      "description": "Human-readable description",
      "text_prompt": "Detailed prompt for AI video generation, cinematic, high quality",
      "camera_movement": "static/pan/zoom/dolly",
      "camera_angle": "eye_level/low_angle/high_angle/birds_eye",
      "motion_intensity": 0.5
    }
  ],
  "style": {
    "mood": "calm/energetic/dramatic",
    "color_palette": "warm/cool/vibrant",
    "lighting": "natural/dramatic/soft"
  }
}"#;

/// User turn for one request.
pub fn user_message(request: &StoryboardRequest) -> String {
    let mut message = format!(
        "Create a storyboard for this video concept:\n\n\"{}\"\n\nRequirements:\n\
         - Generate between {} and {} shots\n\
         - Each shot should be 2-4 seconds long\n\
         - Total video duration should be under {} seconds\n",
        request.prompt,
        request.max_shots.min(3),
        request.max_shots,
        format_secs(request.max_duration_secs),
    );

    if let Some(style) = &request.style_preferences {
        let pretty = serde_json::to_string_pretty(style).unwrap_or_else(|_| style.to_string());
        message.push_str(&format!("\nStyle preferences: {pretty}"));
    }

    message.push_str("\n\nProvide ONLY the JSON output, no additional text.");
    message
}

fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as i64)
    } else {
        format!("{secs}")
    }
}
