use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{events, EditSignal, SaveWatcher, TickOutcome, WatcherSnapshot};
use crate::save_file::SaveEditor;
use crate::settings::WatcherSettings;
use crate::splits::SplitTarget;
use crate::timer_bridge::TimerBridge;

enum WatchCommand {
    ReplaceSplits(Vec<SplitTarget>),
    Retry,
}

/// Owner side of a running watch loop.
pub struct WatcherHandle {
    edit_signal: EditSignal,
    command_tx: mpsc::UnboundedSender<WatchCommand>,
    snapshot_rx: watch::Receiver<WatcherSnapshot>,
    stop_tx: Option<mpsc::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
    settings: WatcherSettings,
}

pub fn spawn_watcher(settings: WatcherSettings, bridge: Box<dyn TimerBridge>) -> WatcherHandle {
    let watcher = SaveWatcher::new(settings.clone(), bridge);
    let edit_signal = watcher.edit_signal();
    let (snapshot_tx, snapshot_rx) = watch::channel(watcher.snapshot());
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>(1);

    tracing::info!(
        save_path = %settings.save_path.display(),
        poll_interval_ms = settings.poll_interval().as_millis() as u64,
        "Starting save file watcher"
    );

    let join_handle = tokio::spawn(run_watch_loop(watcher, command_rx, snapshot_tx, stop_rx));

    WatcherHandle {
        edit_signal,
        command_tx,
        snapshot_rx,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
        settings,
    }
}

impl WatcherHandle {
    /// Marks the next detected change as a self-edit.
    pub fn begin_edit(&self) {
        self.edit_signal.begin_edit();
    }

    pub fn edit_signal(&self) -> EditSignal {
        self.edit_signal.clone()
    }

    pub fn save_editor(&self) -> SaveEditor {
        SaveEditor::new(self.settings.save_path.clone(), self.edit_signal())
    }

    pub fn replace_splits(&self, splits: Vec<SplitTarget>) -> Result<(), String> {
        self.command_tx
            .send(WatchCommand::ReplaceSplits(splits))
            .map_err(|_| "Save watcher is not running".to_string())
    }

    pub fn retry(&self) -> Result<(), String> {
        self.command_tx
            .send(WatchCommand::Retry)
            .map_err(|_| "Save watcher is not running".to_string())
    }

    pub fn subscribe(&self) -> watch::Receiver<WatcherSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn latest(&self) -> WatcherSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Lets the in-flight tick finish, then waits for the loop to exit.
    pub async fn stop(mut self) -> Result<(), String> {
        if let Some(stop_tx) = self.stop_tx.take() {
            if stop_tx.send(()).await.is_err() {
                tracing::debug!("Save watcher loop already exited");
            }
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|error| format!("Save watcher task failed: {error}"))?;
        }

        tracing::info!("Save file watcher stopped");
        Ok(())
    }
}

async fn run_watch_loop(
    mut watcher: SaveWatcher,
    mut command_rx: mpsc::UnboundedReceiver<WatchCommand>,
    snapshot_tx: watch::Sender<WatcherSnapshot>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval(watcher.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                apply_pending_commands(&mut watcher, &mut command_rx);

                let outcome = watcher.tick();
                if outcome == TickOutcome::NoSaveFile {
                    tracing::debug!("Save watcher idle until retry");
                }

                events::publish_snapshot(&snapshot_tx, watcher.snapshot());
            }
        }
    }
}

fn apply_pending_commands(
    watcher: &mut SaveWatcher,
    command_rx: &mut mpsc::UnboundedReceiver<WatchCommand>,
) {
    while let Ok(command) = command_rx.try_recv() {
        match command {
            WatchCommand::ReplaceSplits(splits) => watcher.replace_splits(splits),
            WatchCommand::Retry => watcher.retry(),
        }
    }
}
