//! ComfyUI shot backend.
//!
//! Submits a workflow template over the ComfyUI REST API, follows its
//! execution over the WebSocket, and downloads the produced clip.

pub mod api;
pub mod backend;
pub mod client;
pub mod messages;
pub mod processor;
pub mod workflow;

pub use backend::{ComfyUIBackend, ComfyUIBackendConfig};
