use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use replies_core::types::Channel;
use replies_process::ProcessingCoordinator;
use replies_queue::{QueueConsumer, SqliteQueue};

/// Polls a single per-channel trigger queue and hands each message to the
/// coordinator. One of these runs per channel so a slow AI turn on one
/// channel never starves the others.
#[allow(clippy::too_many_arguments)]
pub async fn run_queue_loop(
    coordinator: Arc<ProcessingCoordinator>,
    queue: Arc<SqliteQueue>,
    channel: Channel,
    queue_name: String,
    poll_interval: Duration,
    visibility_timeout_secs: u64,
    max_receive_count: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(queue_name, "worker loop started");
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&coordinator, &queue, channel, &queue_name, visibility_timeout_secs, max_receive_count).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(queue_name, "worker loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Receive and process at most one trigger from `queue_name`. Shared by the
/// long-running loop and `--once` mode.
pub async fn poll_once(
    coordinator: &ProcessingCoordinator,
    queue: &Arc<SqliteQueue>,
    channel: Channel,
    queue_name: &str,
    visibility_timeout_secs: u64,
    max_receive_count: u32,
) -> bool {
    match queue.receive(queue_name, visibility_timeout_secs, max_receive_count) {
        Ok(Some(message)) => {
            if let Err(e) = coordinator.process(channel, queue_name, message).await {
                warn!(queue_name, error = %e, code = e.code(), "trigger processing failed");
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            error!(queue_name, error = %e, "queue receive failed");
            false
        }
    }
}
