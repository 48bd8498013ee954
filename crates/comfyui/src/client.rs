//! WebSocket client for connecting to a ComfyUI instance.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

pub type ComfyUIStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for one ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection.
///
/// ComfyUI only routes progress messages for a prompt to the socket whose
/// `client_id` submitted it, so the id must be reused for submission.
pub struct ComfyUIConnection {
    pub client_id: String,
    pub ws_stream: ComfyUIStream,
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Open a socket under a fresh `client_id`.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = socket_url(&self.ws_url, &client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::debug!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id,
            ws_stream,
        })
    }
}

fn socket_url(ws_url: &str, client_id: &str) -> String {
    format!("{ws_url}/ws?clientId={client_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The socket failed or closed before the prompt finished.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
