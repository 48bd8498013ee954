//! [`StoryboardGenerator`] backed by the Anthropic Messages API.

use async_trait::async_trait;
use clipforge_core::error::CoreError;
use clipforge_core::storyboard::{Storyboard, StoryboardGenerator, StoryboardRequest};
use serde::{Deserialize, Serialize};

use super::parse::{parse_storyboard, ShotDefaults};
use super::prompt::{user_message, STORYBOARD_SYSTEM_PROMPT};
use crate::config::PipelineConfig;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const GENERATOR_NAME: &str = "claude";

#[derive(Debug, thiserror::Error)]
pub enum StoryboardGenerationError {
    #[error("storyboard generator is not configured: {0}")]
    Unavailable(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Anthropic API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Parse(String),
}

impl From<StoryboardGenerationError> for CoreError {
    fn from(err: StoryboardGenerationError) -> Self {
        match err {
            StoryboardGenerationError::Unavailable(msg) => CoreError::Configuration(msg),
            other => CoreError::collaborator("storyboard generation", other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

pub struct ClaudeStoryboardGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
    defaults: ShotDefaults,
}

impl ClaudeStoryboardGenerator {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: ANTHROPIC_API_URL.to_string(),
            api_key: config.anthropic_api_key.clone(),
            model: config.storyboard_model.clone(),
            max_tokens: config.storyboard_max_tokens,
            temperature: config.storyboard_temperature,
            defaults: ShotDefaults {
                duration_secs: config.default_shot_duration_secs,
                num_frames: config.default_num_frames,
                fps: config.default_fps,
            },
        }
    }

    /// Point at a different Messages API host.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request_storyboard(
        &self,
        request: &StoryboardRequest,
    ) -> Result<Storyboard, StoryboardGenerationError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            StoryboardGenerationError::Unavailable("ANTHROPIC_API_KEY is not set".into())
        })?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: STORYBOARD_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: user_message(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StoryboardGenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: MessagesResponse = response.json().await?;
        let text = reply.text();
        tracing::debug!(model = %self.model, reply_len = text.len(), "Storyboard reply received");

        parse_storyboard(
            &text,
            &request.prompt,
            request.max_shots,
            request.max_duration_secs,
            &self.defaults,
            GENERATOR_NAME,
        )
    }
}

#[async_trait]
impl StoryboardGenerator for ClaudeStoryboardGenerator {
    fn name(&self) -> &str {
        GENERATOR_NAME
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, request: &StoryboardRequest) -> Result<Storyboard, CoreError> {
        let storyboard = self.request_storyboard(request).await?;
        storyboard.validate()?;
        tracing::info!(
            storyboard_id = %storyboard.id,
            shots = storyboard.shot_count(),
            duration = storyboard.total_duration_seconds,
            "Storyboard generated",
        );
        Ok(storyboard)
    }
}
