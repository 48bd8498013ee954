use std::sync::Arc;

use clipforge_pipeline::Orchestrator;

use crate::config::ServerConfig;
use crate::engine::JobRunner;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job lifecycle owner: store, backend registry, progress broadcaster.
    pub orchestrator: Arc<Orchestrator>,
    /// Background executor for queued jobs.
    pub runner: Arc<JobRunner>,
    /// WebSocket connection manager (progress subscribers).
    pub ws_manager: Arc<WsManager>,
}
