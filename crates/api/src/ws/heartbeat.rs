use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::ws::manager::WsManager;

/// Spawn a background task that pings every progress socket once per
/// `every`, dropping connections whose writer task has exited. Abort the
/// returned handle on shutdown.
pub fn start_heartbeat(ws_manager: Arc<WsManager>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let dropped = ws_manager.ping_all().await;
            if dropped > 0 {
                tracing::info!(dropped, "Dropped stale progress sockets");
            }
            let count = ws_manager.connection_count().await;
            let jobs = ws_manager.watched_job_count().await;
            tracing::debug!(
                count,
                jobs,
                "Progress socket heartbeat",
            );
        }
    })
}
