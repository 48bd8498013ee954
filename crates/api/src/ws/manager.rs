use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use clipforge_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Job whose progress this connection follows.
    pub job_id: String,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Progress events themselves travel through
/// the pipeline's broadcaster; this map carries control frames (pong,
/// heartbeat ping, close on shutdown).
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String, job_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            job_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Queue a message for one connection. Returns `false` if the
    /// connection is gone.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        self.connections
            .read()
            .await
            .get(conn_id)
            .is_some_and(|conn| conn.sender.send(message).is_ok())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Connections currently following `job_id`.
    pub async fn job_connection_count(&self, job_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.job_id == job_id)
            .count()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Distinct jobs with at least one connection.
    pub async fn watched_job_count(&self) -> usize {
        let conns = self.connections.read().await;
        let mut jobs: Vec<&str> = conns.values().map(|c| c.job_id.as_str()).collect();
        jobs.sort_unstable();
        jobs.dedup();
        jobs.len()
    }

    /// Send a Ping frame to every connected client, dropping connections
    /// whose writer has gone away. Returns how many were dropped.
    pub async fn ping_all(&self) -> usize {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|_, conn| conn.sender.send(Message::Ping(Bytes::new())).is_ok());
        before - conns.len()
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
