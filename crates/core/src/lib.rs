//! Domain model and collaborator interfaces for the clipforge pipeline.
//!
//! Everything here is free of HTTP and storage concerns: job and storyboard
//! records, the progress weighting, the workspace file layout, and the
//! traits the orchestrator drives (storyboard generation, shot generation,
//! media assembly).

pub mod assembly;
pub mod backend;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod layout;
pub mod progress;
pub mod storyboard;
pub mod types;
