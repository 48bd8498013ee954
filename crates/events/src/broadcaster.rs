//! Multi-subscriber progress fan-out keyed by job id.
//!
//! Each subscriber owns an unbounded channel, so publishing never waits on
//! a slow consumer. A subscriber whose receiver has been dropped is pruned
//! the next time something is published for its job.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::event::ProgressEvent;

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub job_id: String,
    pub receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

type SubscriberMap = HashMap<String, mpsc::UnboundedSender<ProgressEvent>>;

/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared between the orchestrator and the WebSocket layer.
#[derive(Default)]
pub struct ProgressBroadcaster {
    jobs: RwLock<HashMap<String, SubscriberMap>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `job_id`.
    pub async fn subscribe(&self, job_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = uuid::Uuid::new_v4().to_string();
        self.jobs
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .insert(id.clone(), tx);
        tracing::debug!(job_id, subscriber_id = %id, "Progress subscriber added");
        Subscription {
            id,
            job_id: job_id.to_string(),
            receiver: rx,
        }
    }

    /// Remove a subscriber. The job entry is dropped once it has none left.
    pub async fn unsubscribe(&self, job_id: &str, subscriber_id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(subs) = jobs.get_mut(job_id) {
            subs.remove(subscriber_id);
            if subs.is_empty() {
                jobs.remove(job_id);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `job_id`.
    ///
    /// Returns the number of subscribers it was delivered to.
    pub async fn publish(&self, job_id: &str, event: &ProgressEvent) -> usize {
        let dead: Vec<String> = {
            let jobs = self.jobs.read().await;
            let Some(subs) = jobs.get(job_id) else {
                return 0;
            };
            subs.iter()
                .filter(|(_, tx)| tx.send(event.clone()).is_err())
                .map(|(id, _)| id.clone())
                .collect()
        };

        if !dead.is_empty() {
            let mut jobs = self.jobs.write().await;
            if let Some(subs) = jobs.get_mut(job_id) {
                for id in &dead {
                    subs.remove(id);
                }
                if subs.is_empty() {
                    jobs.remove(job_id);
                }
            }
            tracing::debug!(job_id, removed = dead.len(), "Pruned closed progress subscribers");
        }

        self.subscriber_count(job_id).await
    }

    pub async fn subscriber_count(&self, job_id: &str) -> usize {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Number of jobs with at least one subscriber.
    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drop every subscriber, closing their channels.
    ///
    /// Used during graceful shutdown.
    pub async fn close_all(&self) {
        let mut jobs = self.jobs.write().await;
        let count: usize = jobs.values().map(HashMap::len).sum();
        jobs.clear();
        tracing::info!(count, "Closed all progress subscriptions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let broadcaster = ProgressBroadcaster::new();
        let delivered = broadcaster
            .publish("job_1", &ProgressEvent::progress("job_1", "x", 1.0))
            .await;
        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.job_count().await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_prunes_empty_job() {
        let broadcaster = ProgressBroadcaster::new();
        let sub = broadcaster.subscribe("job_1").await;
        assert_eq!(broadcaster.job_count().await, 1);

        broadcaster.unsubscribe("job_1", &sub.id).await;
        assert_eq!(broadcaster.job_count().await, 0);
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_job() {
        let broadcaster = ProgressBroadcaster::new();
        let mut a = broadcaster.subscribe("job_a").await;
        let mut b = broadcaster.subscribe("job_b").await;

        broadcaster
            .publish("job_a", &ProgressEvent::progress("job_a", "x", 5.0))
            .await;

        assert_eq!(a.receiver.recv().await.unwrap().job_id, "job_a");
        assert!(b.receiver.try_recv().is_err());
    }
}
