//! Job execution engine.
//!
//! Runs orchestrator executions as background tasks, bounded by
//! `MAX_CONCURRENT_JOBS`, and drains them on shutdown. Also keeps backend
//! availability current while the server runs.

pub mod availability;
pub mod runner;

pub use availability::start_availability_refresh;
pub use runner::JobRunner;
