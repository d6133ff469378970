use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::lock_store::LockStore;
use crate::stage_store::StageStore;

/// Periodically clears expired `StagedFragment`/`TriggerLock` rows.
///
/// Both stores already filter expired rows out of their read paths, so this
/// task only bounds table growth — correctness holds even if this task is
/// delayed or briefly down.
pub async fn run(
    stage: Arc<StageStore>,
    locks: Arc<LockStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?interval, "stage/lock sweeper started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match stage.sweep_expired() {
                    Ok(n) if n > 0 => info!(count = n, "swept expired staged fragments"),
                    Err(e) => error!(error = %e, "fragment sweep failed"),
                    _ => {}
                }
                match locks.sweep_expired() {
                    Ok(n) if n > 0 => info!(count = n, "swept expired trigger locks"),
                    Err(e) => error!(error = %e, "lock sweep failed"),
                    _ => {}
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("stage/lock sweeper shutting down");
                    break;
                }
            }
        }
    }
}
