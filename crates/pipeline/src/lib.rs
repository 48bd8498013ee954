//! Job orchestration: storyboard → shots → assembly → finalize.
//!
//! [`Orchestrator`] owns the job lifecycle. Collaborators are injected as
//! trait objects so the HTTP binary wires real providers and tests wire
//! fakes.

pub mod backends;
pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod storyboard;

pub use config::PipelineConfig;
pub use orchestrator::{CreateJobRequest, Orchestrator, ProgressObserver};
pub use registry::{BackendInfo, BackendRegistry};
