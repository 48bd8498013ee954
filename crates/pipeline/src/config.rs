use std::path::{Path, PathBuf};
use std::time::Duration;

use clipforge_core::assembly::{EncodeSettings, DEFAULT_CRF, DEFAULT_PIXEL_FORMAT, DEFAULT_VIDEO_CODEC};
use clipforge_core::layout::FileLayout;
use clipforge_core::storyboard::{DEFAULT_FPS, DEFAULT_NUM_FRAMES};

pub const DEFAULT_BACKEND: &str = "replicate:svd-xt";
pub const DEFAULT_STORYBOARD_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Settings for an optional ComfyUI shot backend.
#[derive(Debug, Clone)]
pub struct ComfyUISettings {
    pub backend_id: String,
    pub api_url: String,
    pub ws_url: String,
    pub workflow_path: PathBuf,
    pub negative_prompt: String,
}

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the `videos/`, `jobs/`, `uploads/` and `temp/` directories.
    pub workspace_dir: PathBuf,

    pub max_video_duration_secs: f64,
    pub max_shots_per_video: usize,
    pub default_shot_duration_secs: f64,
    pub default_fps: u32,
    pub default_num_frames: u32,
    pub default_backend: String,

    pub storyboard_timeout: Duration,
    pub shot_timeout: Duration,
    pub assembly_timeout: Duration,

    pub encode: EncodeSettings,

    pub anthropic_api_key: Option<String>,
    pub storyboard_model: String,
    pub storyboard_max_tokens: u32,
    pub storyboard_temperature: f64,

    pub replicate_api_token: Option<String>,
    /// How often a running Replicate prediction is polled.
    pub replicate_poll_interval: Duration,

    pub comfyui: Option<ComfyUISettings>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                        |
    /// |----------------------------|--------------------------------|
    /// | `WORKSPACE_DIR`            | `./workspace`                  |
    /// | `MAX_VIDEO_DURATION`       | `60`                           |
    /// | `MAX_SHOTS_PER_VIDEO`      | `10`                           |
    /// | `DEFAULT_SHOT_DURATION`    | `3.0`                          |
    /// | `DEFAULT_FPS`              | `8`                            |
    /// | `DEFAULT_NUM_FRAMES`       | `81`                           |
    /// | `DEFAULT_BACKEND`          | `replicate:svd-xt`             |
    /// | `STORYBOARD_TIMEOUT_SECS`  | `120`                          |
    /// | `SHOT_TIMEOUT_SECS`        | `900`                          |
    /// | `ASSEMBLY_TIMEOUT_SECS`    | `300`                          |
    /// | `VIDEO_CODEC`              | `libx264`                      |
    /// | `VIDEO_PIXEL_FORMAT`       | `yuv420p`                      |
    /// | `VIDEO_CRF`                | `23`                           |
    /// | `ANTHROPIC_API_KEY`        | unset                          |
    /// | `STORYBOARD_MODEL`         | `claude-3-5-sonnet-20241022`   |
    /// | `STORYBOARD_MAX_TOKENS`    | `4000`                         |
    /// | `STORYBOARD_TEMPERATURE`   | `0.7`                          |
    /// | `REPLICATE_API_TOKEN`      | unset                          |
    /// | `REPLICATE_POLL_SECS`      | `2`                            |
    /// | `COMFYUI_API_URL`          | unset (ComfyUI disabled)       |
    /// | `COMFYUI_WS_URL`           | derived from `COMFYUI_API_URL` |
    /// | `COMFYUI_WORKFLOW_PATH`    | `./workflows/shot.json`        |
    /// | `COMFYUI_BACKEND_ID`       | `comfyui:default`              |
    /// | `COMFYUI_NEGATIVE_PROMPT`  | empty                          |
    pub fn from_env() -> Self {
        let defaults = Self::for_workspace(env_or("WORKSPACE_DIR", "./workspace"));

        let comfyui = optional_env("COMFYUI_API_URL").map(|api_url| {
            let ws_url = optional_env("COMFYUI_WS_URL").unwrap_or_else(|| ws_url_for(&api_url));
            ComfyUISettings {
                backend_id: env_or("COMFYUI_BACKEND_ID", "comfyui:default"),
                ws_url,
                api_url,
                workflow_path: PathBuf::from(env_or("COMFYUI_WORKFLOW_PATH", "./workflows/shot.json")),
                negative_prompt: env_or("COMFYUI_NEGATIVE_PROMPT", ""),
            }
        });

        Self {
            max_video_duration_secs: parse_env("MAX_VIDEO_DURATION", defaults.max_video_duration_secs),
            max_shots_per_video: parse_env("MAX_SHOTS_PER_VIDEO", defaults.max_shots_per_video),
            default_shot_duration_secs: parse_env(
                "DEFAULT_SHOT_DURATION",
                defaults.default_shot_duration_secs,
            ),
            default_fps: parse_env("DEFAULT_FPS", defaults.default_fps),
            default_num_frames: parse_env("DEFAULT_NUM_FRAMES", defaults.default_num_frames),
            default_backend: env_or("DEFAULT_BACKEND", DEFAULT_BACKEND),
            storyboard_timeout: Duration::from_secs(parse_env("STORYBOARD_TIMEOUT_SECS", 120)),
            shot_timeout: Duration::from_secs(parse_env("SHOT_TIMEOUT_SECS", 900)),
            assembly_timeout: Duration::from_secs(parse_env("ASSEMBLY_TIMEOUT_SECS", 300)),
            encode: EncodeSettings {
                codec: env_or("VIDEO_CODEC", DEFAULT_VIDEO_CODEC),
                pixel_format: env_or("VIDEO_PIXEL_FORMAT", DEFAULT_PIXEL_FORMAT),
                crf: parse_env("VIDEO_CRF", DEFAULT_CRF),
            },
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            storyboard_model: env_or("STORYBOARD_MODEL", DEFAULT_STORYBOARD_MODEL),
            storyboard_max_tokens: parse_env("STORYBOARD_MAX_TOKENS", defaults.storyboard_max_tokens),
            storyboard_temperature: parse_env(
                "STORYBOARD_TEMPERATURE",
                defaults.storyboard_temperature,
            ),
            replicate_api_token: optional_env("REPLICATE_API_TOKEN"),
            replicate_poll_interval: Duration::from_secs(parse_env("REPLICATE_POLL_SECS", 2)),
            comfyui,
            ..defaults
        }
    }

    /// Defaults rooted at `workspace_dir`, with no provider credentials.
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            max_video_duration_secs: 60.0,
            max_shots_per_video: 10,
            default_shot_duration_secs: 3.0,
            default_fps: DEFAULT_FPS,
            default_num_frames: DEFAULT_NUM_FRAMES,
            default_backend: DEFAULT_BACKEND.to_string(),
            storyboard_timeout: Duration::from_secs(120),
            shot_timeout: Duration::from_secs(900),
            assembly_timeout: Duration::from_secs(300),
            encode: EncodeSettings::default(),
            anthropic_api_key: None,
            storyboard_model: DEFAULT_STORYBOARD_MODEL.to_string(),
            storyboard_max_tokens: 4000,
            storyboard_temperature: 0.7,
            replicate_api_token: None,
            replicate_poll_interval: Duration::from_secs(2),
            comfyui: None,
        }
    }

    pub fn layout(&self) -> FileLayout {
        FileLayout::under(&self.workspace_dir)
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Shot bound handed to the storyboard generator for a job that asked
    /// for `requested` shots.
    pub fn storyboard_shot_limit(&self, requested: usize) -> usize {
        let by_duration = if self.default_shot_duration_secs > 0.0 {
            (self.max_video_duration_secs / self.default_shot_duration_secs).floor() as usize
        } else {
            self.max_shots_per_video
        };
        requested.min(self.max_shots_per_video).min(by_duration).max(1)
    }
}

// ---- private helpers ----

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

/// `http://host:8188` → `ws://host:8188`, `https://` → `wss://`.
fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}
