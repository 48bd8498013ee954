//! FFmpeg/FFprobe implementation of [`MediaAssembler`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::assembly::{
    build_xfade_filter, concat_list_contents, AssemblyPlan, AssemblyStrategy, EncodeSettings,
    MediaAssembler,
};
use crate::error::CoreError;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

impl From<FfmpegError> for CoreError {
    fn from(err: FfmpegError) -> Self {
        CoreError::collaborator("assembly", err.to_string())
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// ffprobe JSON output (`-show_entries stream=codec_type,duration:format=duration -of json`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Runs `ffprobe` and `ffmpeg` as subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    encode: EncodeSettings,
    /// Where concat list files are written.
    temp_dir: PathBuf,
}

impl FfmpegAssembler {
    pub fn new(encode: EncodeSettings, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            encode,
            temp_dir: temp_dir.into(),
        }
    }

    /// Run `ffprobe` on a video file and return the parsed JSON output.
    pub async fn probe_video(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        if !path.exists() {
            return Err(FfmpegError::VideoNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let output = tokio::process::Command::new(&self.ffprobe_bin)
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type,duration:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
    }

    async fn concat_stream_copy(&self, clips: &[PathBuf], output: &Path) -> Result<(), FfmpegError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let stem = output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let list_file = self
            .temp_dir
            .join(format!("concat_list_{stem}_{}.txt", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&list_file, concat_list_contents(clips)).await?;

        let mut cmd = tokio::process::Command::new(&self.ffmpeg_bin);
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c", "copy", "-y"])
            .arg(output);
        let result = run(cmd).await;

        let _ = tokio::fs::remove_file(&list_file).await;
        result
    }

    async fn crossfade(
        &self,
        plan: &AssemblyPlan,
        transition: f64,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        let filter = build_xfade_filter(&plan.durations, transition);

        let mut cmd = tokio::process::Command::new(&self.ffmpeg_bin);
        for clip in &plan.clips {
            cmd.arg("-i").arg(clip);
        }
        let crf = self.encode.crf.to_string();
        cmd.args(["-filter_complex", filter.as_str(), "-map", "[outv]"])
            .args(["-c:v", self.encode.codec.as_str()])
            .args(["-pix_fmt", self.encode.pixel_format.as_str()])
            .args(["-crf", crf.as_str()])
            .arg("-y")
            .arg(output);
        run(cmd).await
    }
}

#[async_trait]
impl MediaAssembler for FfmpegAssembler {
    async fn probe_duration(&self, path: &Path) -> Result<f64, CoreError> {
        let probe = self.probe_video(path).await?;
        let duration = parse_duration(&probe);
        if duration <= 0.0 {
            return Err(FfmpegError::ParseError(format!(
                "no duration reported for {}",
                path.display()
            ))
            .into());
        }
        Ok(duration)
    }

    async fn render(&self, plan: &AssemblyPlan, output: &Path) -> Result<(), CoreError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(FfmpegError::from)?;
        }

        tracing::debug!(
            clips = plan.clips.len(),
            strategy = ?plan.strategy,
            output = %output.display(),
            "Rendering final video",
        );

        match plan.strategy {
            AssemblyStrategy::StreamCopy => self.concat_stream_copy(&plan.clips, output).await?,
            AssemblyStrategy::Crossfade { transition } => {
                self.crossfade(plan, transition, output).await?
            }
        }
        Ok(())
    }
}

async fn run(mut cmd: tokio::process::Command) -> Result<(), FfmpegError> {
    let output = cmd.output().await.map_err(FfmpegError::NotFound)?;
    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Try format-level duration first.
    if let Some(secs) = probe.format.duration.as_deref().and_then(|d| d.parse().ok()) {
        return secs;
    }
    first_video_stream(probe)
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0)
}
