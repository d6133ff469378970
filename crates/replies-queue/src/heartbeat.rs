use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::queue::{QueueConsumer, SqliteQueue};

/// Keeps a single in-flight message's visibility timeout from expiring
/// while a long-running turn is in progress.
///
/// Spawned alongside `ProcessingCoordinator::process` and stopped once the
/// turn finishes (success or failure) — dropping the returned `stop`
/// sender is enough, the task exits on the next tick after the channel
/// closes.
pub struct VisibilityHeartbeat {
    stop_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl VisibilityHeartbeat {
    /// `heartbeat_interval` is H; every H the heartbeat extends visibility
    /// by `visibility_extension` (E). E must exceed H by a wide enough
    /// margin that a single missed tick doesn't let the message reappear
    /// for a second consumer.
    pub fn spawn(
        queue: Arc<SqliteQueue>,
        queue_name: String,
        message_id: String,
        heartbeat_interval: Duration,
        visibility_extension: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match queue.extend_visibility(
                            &queue_name,
                            &message_id,
                            visibility_extension.as_secs(),
                        ) {
                            Ok(()) => info!(%queue_name, %message_id, "visibility extended"),
                            Err(e) => error!(%queue_name, %message_id, error = %e, "failed to extend visibility"),
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop_tx, handle }
    }

    /// Stop extending and wait for the background task to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}
