//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Queue depth broadcast.
    #[serde(rename = "status")]
    Status(StatusData),

    #[serde(rename = "execution_start")]
    ExecutionStart(PromptRef),

    /// Some nodes were served from cache.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node is executing; `node == None` means the prompt finished.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step progress from a long-running node (e.g. a sampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Sent by newer servers once every node has run.
    #[serde(rename = "execution_success")]
    ExecutionSuccess(PromptRef),

    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(PromptRef),

    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

impl ComfyUIMessage {
    /// Prompt this message belongs to, when the message carries one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::ExecutionStart(d) | Self::ExecutionSuccess(d) | Self::ExecutionInterrupted(d) => {
                Some(&d.prompt_id)
            }
            Self::ExecutionCached(d) => Some(&d.prompt_id),
            Self::Executing(d) => Some(&d.prompt_id),
            Self::Progress(d) => d.prompt_id.as_deref(),
            Self::Executed(d) => Some(&d.prompt_id),
            Self::ExecutionError(d) => Some(&d.prompt_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i32,
    pub max: i32,
    /// Older servers omit these.
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

impl ProgressData {
    /// Step progress as 0–100.
    pub fn percent(&self) -> f64 {
        if self.max > 0 {
            (self.value as f64 / self.max as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: String,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Parse a text frame. Unknown `type` values are an error; callers log
/// and continue.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
