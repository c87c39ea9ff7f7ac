use std::path::PathBuf;

use tokio::sync::watch;

use super::WatcherSnapshot;
use crate::timer_bridge::TimerBridge;

pub(super) fn notify_timer_start(bridge: &mut dyn TimerBridge) {
    if let Err(error) = bridge.start() {
        tracing::error!("Failed to signal timer start: {error}");
    }
}

pub(super) fn notify_timer_reset(bridge: &mut dyn TimerBridge) {
    if let Err(error) = bridge.reset() {
        tracing::error!("Failed to signal timer reset: {error}");
    }
}

pub(super) fn notify_timer_split(bridge: &mut dyn TimerBridge) {
    if let Err(error) = bridge.split() {
        tracing::error!("Failed to signal timer split: {error}");
    }
}

pub(super) fn report_persistence_result(artifact: &str, result: Result<PathBuf, String>) {
    match result {
        Ok(path) => {
            tracing::debug!(artifact, path = %path.display(), "Persisted watcher artifact");
        }
        Err(error) => {
            tracing::warn!(artifact, persistence_error = %error, "Failed to persist watcher artifact");
        }
    }
}

/// Publishes `snapshot` only when it differs from the last one sent.
pub(super) fn publish_snapshot(snapshot_tx: &watch::Sender<WatcherSnapshot>, snapshot: WatcherSnapshot) {
    snapshot_tx.send_if_modified(|current| {
        if *current == snapshot {
            return false;
        }

        *current = snapshot;
        true
    });
}
