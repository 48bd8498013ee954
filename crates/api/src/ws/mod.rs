//! WebSocket infrastructure for live job progress.
//!
//! Provides connection management, heartbeat pings, and the HTTP upgrade
//! handler mounted at `/ws/jobs/{id}`.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::job_progress_ws;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
