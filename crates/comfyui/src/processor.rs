//! Follows one prompt's execution over the WebSocket.
//!
//! Frames for other prompts (ComfyUI broadcasts queue-wide status) are
//! ignored. Step progress is forwarded to the shot's
//! [`ProgressReporter`].

use clipforge_core::backend::ProgressReporter;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::client::{ComfyUIClientError, ComfyUIStream};
use crate::messages::{parse_message, ComfyUIMessage};

/// Share of the shot's sub-progress covered by sampling steps. The rest
/// is reserved for history lookup and download.
const SAMPLING_SHARE: f64 = 80.0;
const SAMPLING_OFFSET: f64 = 10.0;

/// How a prompt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome {
    Completed,
    Failed(String),
    Interrupted,
}

/// What a single message means for the prompt being followed.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Ignore,
    Progress(f64),
    Finished(PromptOutcome),
}

/// Interpret one message for `prompt_id`.
pub fn interpret(msg: &ComfyUIMessage, prompt_id: &str) -> Step {
    // Progress frames from old servers have no prompt id; accept them
    // since the socket is private to this prompt.
    if let Some(id) = msg.prompt_id() {
        if id != prompt_id {
            return Step::Ignore;
        }
    }

    match msg {
        ComfyUIMessage::Progress(data) => {
            Step::Progress(SAMPLING_OFFSET + data.percent() / 100.0 * SAMPLING_SHARE)
        }
        ComfyUIMessage::Executing(data) if data.node.is_none() => {
            Step::Finished(PromptOutcome::Completed)
        }
        ComfyUIMessage::ExecutionSuccess(_) => Step::Finished(PromptOutcome::Completed),
        ComfyUIMessage::ExecutionInterrupted(_) => Step::Finished(PromptOutcome::Interrupted),
        ComfyUIMessage::ExecutionError(data) => Step::Finished(PromptOutcome::Failed(format!(
            "{}: {}",
            if data.exception_type.is_empty() {
                "ExecutionError"
            } else {
                data.exception_type.as_str()
            },
            data.exception_message
        ))),
        _ => Step::Ignore,
    }
}

/// Read frames until `prompt_id` finishes, fails, or the socket closes.
pub async fn wait_for_prompt(
    ws_stream: &mut ComfyUIStream,
    prompt_id: &str,
    progress: &ProgressReporter,
) -> Result<PromptOutcome, ComfyUIClientError> {
    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match parse_message(&text) {
                Ok(msg) => match interpret(&msg, prompt_id) {
                    Step::Ignore => {}
                    Step::Progress(pct) => progress.report("Sampling", pct),
                    Step::Finished(outcome) => {
                        tracing::debug!(prompt_id, ?outcome, "ComfyUI prompt finished");
                        return Ok(outcome);
                    }
                },
                Err(e) => {
                    tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
                }
            },
            Ok(Message::Binary(_)) => {
                // Preview frames.
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                return Err(ComfyUIClientError::Protocol(format!(
                    "socket closed before prompt {prompt_id} finished: {frame:?}"
                )));
            }
            Err(e) => {
                return Err(ComfyUIClientError::Protocol(format!(
                    "receive error while waiting for prompt {prompt_id}: {e}"
                )));
            }
        }
    }
    Err(ComfyUIClientError::Protocol(format!(
        "socket ended before prompt {prompt_id} finished"
    )))
}
