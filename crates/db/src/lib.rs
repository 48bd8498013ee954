//! Durable storage for job and storyboard records.
//!
//! Records are JSON documents on local disk, one file per record, written
//! atomically so a crash never leaves a torn document behind.

pub mod job_store;

pub use job_store::{JobStore, StoreError};
