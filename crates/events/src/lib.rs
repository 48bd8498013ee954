//! Per-job progress fan-out.
//!
//! [`ProgressBroadcaster`] delivers [`ProgressEvent`]s to every subscriber
//! of a job without blocking the publisher.

pub mod broadcaster;
pub mod event;

pub use broadcaster::{ProgressBroadcaster, Subscription};
pub use event::{ProgressEvent, ProgressEventType};
